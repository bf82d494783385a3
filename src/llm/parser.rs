//! 응답 파서 - 추론 구간과 최종 답변 분리
//!
//! 추론형 모델은 `<think>...</think>` 블록 안에 사고 과정을 출력합니다.
//! 구분자가 없으면 추론은 비어 있고 답변은 원문 그대로입니다.

/// 파싱 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub reasoning: String,
    pub answer: String,
}

/// 추론 구간 구분 방식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseParser {
    /// 여는/닫는 태그로 감싼 추론 블록
    Delimited { open: String, close: String },
    /// 추론 구간 없음 (원문 = 답변)
    Undelimited,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::think_tags()
    }
}

impl ResponseParser {
    /// `<think>` / `</think>`
    pub fn think_tags() -> Self {
        Self::Delimited {
            open: "<think>".to_string(),
            close: "</think>".to_string(),
        }
    }

    /// 원문을 추론과 답변으로 분리
    ///
    /// - 첫 번째 완결된 블록의 내용이 추론 (양끝 공백 제거)
    /// - 모든 완결된 블록을 제거한 나머지가 답변 (양끝 공백 제거)
    /// - 완결된 블록이 없으면 추론은 빈 문자열, 답변은 입력 그대로
    pub fn parse(&self, raw: &str) -> ParsedResponse {
        let (open, close) = match self {
            ResponseParser::Undelimited => return unparsed(raw),
            ResponseParser::Delimited { open, close } => (open.as_str(), close.as_str()),
        };

        if open.is_empty() || close.is_empty() {
            return unparsed(raw);
        }

        let mut reasoning: Option<String> = None;
        let mut answer = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(start) = rest.find(open) {
            let after_open = &rest[start + open.len()..];
            let Some(end) = after_open.find(close) else {
                break;
            };

            if reasoning.is_none() {
                reasoning = Some(after_open[..end].trim().to_string());
            }

            answer.push_str(&rest[..start]);
            rest = &after_open[end + close.len()..];
        }

        match reasoning {
            None => unparsed(raw),
            Some(reasoning) => {
                answer.push_str(rest);
                ParsedResponse {
                    reasoning,
                    answer: answer.trim().to_string(),
                }
            }
        }
    }
}

fn unparsed(raw: &str) -> ParsedResponse {
    ParsedResponse {
        reasoning: String::new(),
        answer: raw.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_think_block() {
        let parsed = ResponseParser::default().parse("<think>R</think>A");
        assert_eq!(parsed.reasoning, "R");
        assert_eq!(parsed.answer, "A");
    }

    #[test]
    fn test_no_delimiter_keeps_input() {
        let raw = "  Lightning uses payment channels.\n";
        let parsed = ResponseParser::default().parse(raw);
        assert_eq!(parsed.reasoning, "");
        assert_eq!(parsed.answer, raw);
    }

    #[test]
    fn test_whitespace_trimmed() {
        let parsed =
            ResponseParser::default().parse("<think>\n  weighing options\n</think>\n\n## Answer\n");
        assert_eq!(parsed.reasoning, "weighing options");
        assert_eq!(parsed.answer, "## Answer");
    }

    #[test]
    fn test_multiple_blocks() {
        let parsed =
            ResponseParser::default().parse("<think>first</think>Part 1 <think>second</think>Part 2");
        assert_eq!(parsed.reasoning, "first");
        assert_eq!(parsed.answer, "Part 1 Part 2");
    }

    #[test]
    fn test_unclosed_block_is_ignored() {
        let raw = "<think>never closed";
        let parsed = ResponseParser::default().parse(raw);
        assert_eq!(parsed.reasoning, "");
        assert_eq!(parsed.answer, raw);
    }

    #[test]
    fn test_multiline_reasoning() {
        let parsed = ResponseParser::default().parse("Intro\n<think>a\nb</think>\nBody");
        assert_eq!(parsed.reasoning, "a\nb");
        assert_eq!(parsed.answer, "Intro\n\nBody");
    }

    #[test]
    fn test_undelimited() {
        let raw = "<think>R</think>A";
        let parsed = ResponseParser::Undelimited.parse(raw);
        assert_eq!(parsed.reasoning, "");
        assert_eq!(parsed.answer, raw);
    }

    #[test]
    fn test_custom_delimiters() {
        let parser = ResponseParser::Delimited {
            open: "[[".to_string(),
            close: "]]".to_string(),
        };
        let parsed = parser.parse("[[plan]] result");
        assert_eq!(parsed.reasoning, "plan");
        assert_eq!(parsed.answer, "result");
    }
}
