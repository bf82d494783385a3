//! 답변 생성기 - 프롬프트 구성 + 모델 1회 호출 + 추론 분리

use std::sync::Arc;

use crate::error::{AssistantError, Result};
use crate::knowledge::ScoredChunk;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ParsedResponse, ResponseParser};

use super::memory::{ConversationMemory, Speaker};

/// 답변 생성 temperature (사실 위주)
pub const ANSWER_TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT: &str = "You are an expert Bitcoin Layer 2 (L2) scaling solutions analyst. \
Answer questions based on the provided context about Bitcoin L2 solutions, \
including data from official websites and documentation.";

const INSTRUCTIONS: &str = r#"Instructions:
1. Provide comprehensive, accurate information about Bitcoin L2 solutions
2. Include specific technical details, metrics, TVL data, and performance comparisons when available
3. Mention official website links and resources when discussing specific L2 projects
4. When comparing L2 solutions, highlight key differences in:
   - Technology approach (Lightning, Sidechains, Rollups, etc.)
   - Security model and trust assumptions
   - Transaction throughput and fees
   - Developer tooling and ecosystem
   - Maturity and adoption metrics
5. Be objective and cite specific data points from the context
6. If discussing risks or limitations, be balanced and factual
7. Structure your response clearly with headers and bullet points when appropriate
8. If the question relates to previous questions in the chat history, provide context-aware responses
9. If clarification of a previous answer is needed, refer to your earlier responses"#;

const NO_HISTORY: &str = "(no previous conversation)";

/// 생성 결과
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub reasoning: String,
    /// 프롬프트에 사용된 검색 결과
    pub context: Vec<ScoredChunk>,
}

/// 답변 생성기
pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    parser: ResponseParser,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self::with_parser(model, ResponseParser::default())
    }

    pub fn with_parser(model: Arc<dyn ChatModel>, parser: ResponseParser) -> Self {
        Self { model, parser }
    }

    /// 질문 + 대화 기록 + 검색 결과로 답변 생성
    ///
    /// 실패 시 `Generation` 에러. 메모리는 호출자가 성공 후에만 갱신합니다.
    pub async fn answer(
        &self,
        question: &str,
        memory: &ConversationMemory,
        context: Vec<ScoredChunk>,
    ) -> Result<GeneratedAnswer> {
        let messages = build_messages(question, memory, &context);
        let request = ChatRequest::new(messages, ANSWER_TEMPERATURE);

        let raw = self
            .model
            .complete(&request)
            .await
            .map_err(|e| AssistantError::generation(&e))?;

        let ParsedResponse { reasoning, answer } = self.parser.parse(&raw);
        tracing::debug!(
            "Generated answer: {} chars (reasoning {} chars)",
            answer.len(),
            reasoning.len()
        );

        Ok(GeneratedAnswer {
            answer,
            reasoning,
            context,
        })
    }
}

/// 프롬프트 메시지 구성 (system + user)
pub fn build_messages(
    question: &str,
    memory: &ConversationMemory,
    context: &[ScoredChunk],
) -> Vec<ChatMessage> {
    let context_text = context
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let user = format!(
        "Context Information:\n{}\n\nChat History:\n{}\n\n{}\n\nQuestion: {}\n\nProvide a detailed, well-structured answer:",
        context_text,
        format_history(memory),
        INSTRUCTIONS,
        question
    );

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// 대화 기록을 `Human:` / `AI:` 줄로 직렬화
pub fn format_history(memory: &ConversationMemory) -> String {
    if memory.is_empty() {
        return NO_HISTORY.to_string();
    }

    memory
        .all()
        .iter()
        .map(|entry| match entry.speaker {
            Speaker::Human => format!("Human: {}", entry.content),
            Speaker::Ai => format!("AI: {}", entry.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
