//! Assistant 모듈 - 질의 처리 파이프라인
//!
//! - memory: 질문/답변 로그
//! - generator: 프롬프트 구성 및 답변 생성
//! - citations: 링크, L2 프로젝트, 출처 추출
//! - followup: 후속 질문 생성
//! - session: 위 구성 요소를 묶는 세션 상태

pub mod citations;
pub mod followup;
pub mod generator;
pub mod memory;
pub mod session;

// Re-exports
pub use citations::{extract_citations, Citations, L2_PROJECTS, LINK_DISPLAY_LIMIT};
pub use followup::{parse_numbered_list, truncate_at_sentence, FollowUpGenerator};
pub use generator::{AnswerGenerator, GeneratedAnswer};
pub use memory::{ConversationMemory, MemoryEntry, Speaker, Turn};
pub use session::{
    QueryOutcome, QueryState, ResearchSession, ResponseEnvelope, SAMPLE_QUESTIONS,
};
