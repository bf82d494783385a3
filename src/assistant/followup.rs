//! 후속 질문 생성기
//!
//! 호출이나 파싱이 실패하면 빈 목록을 반환하고 에러를 올리지 않습니다.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::llm::{ChatMessage, ChatModel, ChatRequest, ResponseParser};

/// 후속 질문 생성 temperature (다양성 위주)
pub const FOLLOWUP_TEMPERATURE: f32 = 0.7;

static LINE_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[.)]\s*(.+)$").expect("line item pattern is valid"));

static INLINE_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s+").expect("inline item pattern is valid"));

static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.?!]\s").expect("sentence pattern is valid"));

/// 후속 질문 생성기
pub struct FollowUpGenerator {
    model: Arc<dyn ChatModel>,
    parser: ResponseParser,
}

impl FollowUpGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            parser: ResponseParser::default(),
        }
    }

    /// 이전 질문에 대한 후속 질문 최대 `max`개
    pub async fn generate(&self, previous_query: &str, max: usize) -> Vec<String> {
        if max == 0 || previous_query.trim().is_empty() {
            return Vec::new();
        }

        let request = ChatRequest::new(
            vec![ChatMessage::user(build_prompt(previous_query, max))],
            FOLLOWUP_TEMPERATURE,
        );

        match self.model.complete(&request).await {
            Ok(raw) => {
                let parsed = self.parser.parse(&raw);
                let questions = parse_numbered_list(&parsed.answer, max);
                if questions.is_empty() {
                    tracing::warn!("Could not parse follow-up questions from model reply");
                }
                questions
            }
            Err(e) => {
                tracing::warn!("Follow-up generation failed: {:#}", e);
                Vec::new()
            }
        }
    }
}

/// 후속 질문 프롬프트
pub fn build_prompt(previous_query: &str, max: usize) -> String {
    format!(
        r#"Based on the following user query about Bitcoin Layer 2 technology:
"{}"

Generate {} highly relevant follow-up questions that the user might be interested in asking next.
Each question should:
- Be direct and concise, ending with a question mark
- Contain only the question itself with no explanations
- Focus on Bitcoin Layer 2 technologies
- Be no more than one sentence

Return ONLY a clean list of questions without any explanations:
1. First question?
2. Second question?
3. Third question?"#,
        previous_query, max
    )
}

/// 번호 목록 파싱
///
/// 줄 단위 `1.` / `1)` 항목을 우선하고, 한 줄에 이어진 `1. ... 2. ...` 형태가
/// 더 많은 항목을 주면 그쪽을 사용합니다.
pub fn parse_numbered_list(text: &str, max: usize) -> Vec<String> {
    let line_items: Vec<String> = text
        .lines()
        .filter_map(|line| LINE_ITEM_RE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| clean_item(m.as_str())))
        .filter(|item| !item.is_empty())
        .collect();

    // 첫 번호 이전의 텍스트는 버림
    let inline_items: Vec<String> = INLINE_ITEM_RE
        .split(text)
        .skip(1)
        .map(clean_item)
        .filter(|item| !item.is_empty())
        .collect();

    let mut items = if inline_items.len() > line_items.len() {
        inline_items
    } else {
        line_items
    };

    items.truncate(max);
    items
}

/// 첫 문장 종결 부호(뒤에 공백이 오는 경우)까지만 남김
pub fn truncate_at_sentence(text: &str) -> &str {
    match SENTENCE_END_RE.find(text) {
        Some(m) => &text[..m.start() + 1],
        None => text,
    }
}

fn clean_item(raw: &str) -> String {
    let stripped = raw
        .trim()
        .trim_matches(|c: char| c == '*' || c == '_' || c == '"' || c == '\'' || c == '`')
        .trim();
    truncate_at_sentence(stripped)
        .trim()
        .trim_end_matches(|c: char| c == '*' || c == '_')
        .to_string()
}
