//! Knowledge 모듈 - CSV 기반 RAG 지식 인덱스
//!
//! - Chunker: 재귀적 문자 분할 (1000자 / 200자 오버랩)
//! - Vector: 메모리 내 정확 코사인 검색
//! - Cache: SQLite에 임베딩 영속화 (fingerprint + 모델 일치 시 재사용)
//! - Retriever: 변경 감지, 재빌드, 검색

mod cache;
mod chunker;
mod retriever;
mod vector;

// Re-exports
pub use cache::{CacheMeta, IndexCache};
pub use chunker::{
    chunk_records, default_chunker, Chunk, ChunkConfig, Chunker, RecursiveChunker,
};
pub use retriever::{IndexStatus, Retriever};
pub use vector::{cosine_similarity, IndexedChunk, ScoredChunk, VectorIndex};
