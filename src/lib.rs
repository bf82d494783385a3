//! l2gpt - 비트코인 레이어2 리서치 어시스턴트
//!
//! CSV 데이터셋을 청크로 나누고 Ollama 임베딩으로 벡터 인덱스를 만든 뒤,
//! 검색된 문맥과 대화 기록으로 OpenRouter 채팅 모델에 질의하는 RAG 시스템입니다.

pub mod assistant;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod render;
pub mod storage;

// Re-exports
pub use assistant::{
    extract_citations, AnswerGenerator, Citations, ConversationMemory, FollowUpGenerator,
    QueryOutcome, QueryState, ResearchSession, ResponseEnvelope,
};
pub use config::{get_data_dir, Settings};
pub use dataset::{load_dataset, ChangeStatus, Dataset, Fingerprint, SourceRecord};
pub use embedding::{EmbeddingProvider, OllamaEmbedding};
pub use error::{AssistantError, Result};
pub use knowledge::{
    default_chunker, Chunk, ChunkConfig, Chunker, IndexCache, IndexStatus, RecursiveChunker,
    Retriever, ScoredChunk, VectorIndex,
};
pub use llm::{ChatModel, OpenRouterChat, ParsedResponse, ResponseParser};
pub use storage::{Feedback, FeedbackKind, SessionStore};
