//! Vector Index - 메모리 내 정확 코사인 검색
//!
//! 데이터셋 크기(수백~수천 청크)에서는 ANN 없이 전수 비교로 충분합니다.
//! 인덱스는 빌드에 사용된 데이터셋 fingerprint와 임베딩 모델을 함께 기억합니다.

use anyhow::{bail, Result};

use crate::dataset::Fingerprint;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::chunker::Chunk;

// ============================================================================
// Types
// ============================================================================

/// 임베딩이 붙은 청크
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 벡터 인덱스
#[derive(Debug, Clone)]
pub struct VectorIndex {
    fingerprint: Fingerprint,
    model: String,
    dimension: usize,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// 기존 엔트리로 생성 (캐시 로드용)
    ///
    /// 모든 벡터의 차원이 같아야 합니다.
    pub fn from_entries(
        fingerprint: Fingerprint,
        model: impl Into<String>,
        entries: Vec<IndexedChunk>,
    ) -> Result<Self> {
        let dimension = entries.first().map(|e| e.embedding.len()).unwrap_or(0);

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            bail!(
                "Embedding dimension mismatch at chunk {}: expected {}, got {}",
                bad.chunk.index,
                dimension,
                bad.embedding.len()
            );
        }

        Ok(Self {
            fingerprint,
            model: model.into(),
            dimension,
            entries,
        })
    }

    /// 청크를 임베딩하여 인덱스 빌드
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        fingerprint: Fingerprint,
    ) -> Result<Self> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            bail!(
                "Embedding count mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        Self::from_entries(fingerprint, embedder.name(), entries)
    }

    /// 유사도 상위 k개 검색
    ///
    /// 점수 내림차순, 동점이면 원래 청크 순서를 유지합니다.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query_embedding, &e.embedding),
            })
            .collect();

        // sort_by는 stable
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// 빌드에 사용된 임베딩 모델
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 결과는 -1.0 ~ 1.0 범위이며, 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
