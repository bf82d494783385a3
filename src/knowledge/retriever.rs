//! Retriever - 데이터셋 변경 감지 + 인덱스 빌드 + 유사도 검색
//!
//! 매 질의 전에 데이터셋 fingerprint를 다시 확인하고,
//! 달라졌으면 청크, 벡터 인덱스, 로드된 데이터셋을 모두 버리고 처음부터 다시 만듭니다.

use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::dataset::{self, Dataset, Fingerprint};
use crate::embedding::{EmbeddingProvider, OllamaEmbedding};
use crate::error::{AssistantError, Result};

use super::cache::IndexCache;
use super::chunker::{chunk_records, default_chunker, Chunker};
use super::vector::{ScoredChunk, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 인덱스 확인 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// fingerprint 동일, 기존 인덱스 유지
    Reused,
    /// 디스크 캐시에서 복원
    LoadedFromCache { chunks: usize },
    /// 임베딩부터 새로 빌드
    Rebuilt { chunks: usize },
}

impl IndexStatus {
    pub fn chunk_count(self) -> Option<usize> {
        match self {
            IndexStatus::Reused => None,
            IndexStatus::LoadedFromCache { chunks } | IndexStatus::Rebuilt { chunks } => {
                Some(chunks)
            }
        }
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// 검색기
///
/// 임베더, 청커, (선택) 디스크 캐시, 현재 데이터셋과 인덱스를 소유합니다.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
    cache: Option<IndexCache>,
    dataset: Option<Dataset>,
    index: Option<VectorIndex>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Box<dyn Chunker>,
        cache: Option<IndexCache>,
    ) -> Self {
        Self {
            embedder,
            chunker,
            cache,
            dataset: None,
            index: None,
        }
    }

    /// 설정으로 생성 (Ollama 임베딩 + <data_dir>/index.db 캐시)
    ///
    /// 캐시를 열 수 없으면 경고 후 캐시 없이 동작합니다.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let embedder = OllamaEmbedding::from_settings(settings)?;

        let cache = match IndexCache::open(&settings.index_db_path()) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!("Index cache unavailable, continuing without it: {:#}", e);
                None
            }
        };

        Ok(Self::new(Arc::new(embedder), default_chunker(), cache))
    }

    /// 데이터셋 확인 후 필요하면 재빌드
    ///
    /// 파일 해시가 현재 인덱스와 같으면 아무것도 하지 않습니다.
    pub async fn ensure(&mut self, path: &Path) -> Result<IndexStatus> {
        let current = dataset::fingerprint_file(path)?;

        if self.index.is_some() && !dataset::requires_rebuild(self.fingerprint(), &current) {
            return Ok(IndexStatus::Reused);
        }

        if self.index.is_some() {
            tracing::info!(
                "Dataset changed ({} -> {}), rebuilding index",
                self.fingerprint().map(Fingerprint::short).unwrap_or("-"),
                current.short()
            );
        }

        self.invalidate();
        let dataset = dataset::load_dataset(path)?;
        self.build(dataset, true).await
    }

    /// 캐시를 비우고 강제 재빌드
    pub async fn force_rebuild(&mut self, path: &Path) -> Result<IndexStatus> {
        self.invalidate();
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.clear() {
                tracing::warn!("Failed to clear index cache: {:#}", e);
            }
        }
        let dataset = dataset::load_dataset(path)?;
        self.build(dataset, false).await
    }

    /// 인덱스와 데이터셋 폐기 (다음 ensure에서 재빌드)
    pub fn invalidate(&mut self) {
        if self.index.is_some() {
            tracing::debug!("Invalidating vector index");
        }
        self.index = None;
        self.dataset = None;
    }

    async fn build(&mut self, dataset: Dataset, use_cache: bool) -> Result<IndexStatus> {
        if use_cache {
            if let Some(index) = self.load_cached(&dataset.fingerprint) {
                let chunks = index.len();
                self.index = Some(index);
                self.dataset = Some(dataset);
                return Ok(IndexStatus::LoadedFromCache { chunks });
            }
        }

        let chunks = chunk_records(self.chunker.as_ref(), &dataset);
        tracing::info!(
            "Embedding {} chunks with {}",
            chunks.len(),
            self.embedder.name()
        );

        let index = VectorIndex::build(chunks, self.embedder.as_ref(), dataset.fingerprint.clone())
            .await
            .map_err(|e| AssistantError::embedding(&e))?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(&index) {
                tracing::warn!("Failed to save index cache: {:#}", e);
            }
        }

        let chunks = index.len();
        self.index = Some(index);
        self.dataset = Some(dataset);
        Ok(IndexStatus::Rebuilt { chunks })
    }

    fn load_cached(&self, fingerprint: &Fingerprint) -> Option<VectorIndex> {
        let cache = self.cache.as_ref()?;
        match cache.load(fingerprint, self.embedder.name()) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("Failed to read index cache: {:#}", e);
                None
            }
        }
    }

    /// 유사도 검색 (최대 k개, 점수 내림차순)
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let index = self.index.as_ref().ok_or(AssistantError::IndexUnavailable)?;

        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| AssistantError::embedding(&e))?;

        let results = index.search(&embedding, k);
        tracing::debug!("Retrieved {} chunks (k={})", results.len(), k);
        Ok(results)
    }

    /// 현재 인덱스의 데이터셋 fingerprint
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.index.as_ref().map(VectorIndex::fingerprint)
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn cache(&self) -> Option<&IndexCache> {
        self.cache.as_ref()
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// 키워드 포함 여부로 벡터를 만드는 가짜 임베더 (호출 횟수 기록)
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let lower = text.to_lowercase();
            Ok(["lightning", "liquid", "stacks"]
                .iter()
                .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
                .chain(std::iter::once(0.1))
                .collect())
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    const CSV: &str = "Name,Type\n\
        Lightning Network,Payment channels\n\
        Liquid Network,Federated sidechain\n\
        Stacks,Smart contract layer\n";

    fn write_dataset(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("data.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn retriever_with(embedder: Arc<dyn EmbeddingProvider>, cache: Option<IndexCache>) -> Retriever {
        Retriever::new(embedder, default_chunker(), cache)
    }

    #[tokio::test]
    async fn test_query_before_build_is_unavailable() {
        let retriever = retriever_with(KeywordEmbedder::new(), None);
        let result = retriever.query("lightning", 3).await;
        assert!(matches!(result, Err(AssistantError::IndexUnavailable)));
    }

    #[tokio::test]
    async fn test_ensure_builds_then_reuses() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, CSV);
        let embedder = KeywordEmbedder::new();
        let mut retriever = retriever_with(embedder.clone(), None);

        let status = retriever.ensure(&path).await.unwrap();
        assert_eq!(status, IndexStatus::Rebuilt { chunks: 3 });
        let calls_after_build = embedder.calls.load(Ordering::SeqCst);

        let status = retriever.ensure(&path).await.unwrap();
        assert_eq!(status, IndexStatus::Reused);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_build);
    }

    #[tokio::test]
    async fn test_query_returns_most_similar() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, CSV);
        let mut retriever = retriever_with(KeywordEmbedder::new(), None);
        retriever.ensure(&path).await.unwrap();

        let results = retriever.query("Tell me about Liquid", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.text.contains("Liquid Network"));
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_changed_dataset_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, CSV);
        let mut retriever = retriever_with(KeywordEmbedder::new(), None);
        retriever.ensure(&path).await.unwrap();
        let before = retriever.fingerprint().cloned().unwrap();

        write_dataset(&dir, &format!("{}Ark,Virtual UTXOs\n", CSV));
        let status = retriever.ensure(&path).await.unwrap();

        assert_eq!(status, IndexStatus::Rebuilt { chunks: 4 });
        assert_ne!(retriever.fingerprint(), Some(&before));
        assert_eq!(retriever.dataset().map(Dataset::len), Some(4));
    }

    #[tokio::test]
    async fn test_cache_reused_across_retrievers() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, CSV);
        let db_path = dir.path().join("index.db");

        let mut first = retriever_with(KeywordEmbedder::new(), Some(IndexCache::open(&db_path).unwrap()));
        first.ensure(&path).await.unwrap();

        let embedder = KeywordEmbedder::new();
        let mut second = retriever_with(embedder.clone(), Some(IndexCache::open(&db_path).unwrap()));
        let status = second.ensure(&path).await.unwrap();

        assert_eq!(status, IndexStatus::LoadedFromCache { chunks: 3 });
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_is_not_reused() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, CSV);
        let db_path = dir.path().join("index.db");

        let mut first = retriever_with(KeywordEmbedder::new(), Some(IndexCache::open(&db_path).unwrap()));
        first.ensure(&path).await.unwrap();

        write_dataset(&dir, "Name,Type\nArk,Virtual UTXOs\n");
        let mut second = retriever_with(KeywordEmbedder::new(), Some(IndexCache::open(&db_path).unwrap()));
        let status = second.ensure(&path).await.unwrap();

        assert_eq!(status, IndexStatus::Rebuilt { chunks: 1 });
    }

    #[tokio::test]
    async fn test_force_rebuild_bypasses_cache() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, CSV);
        let db_path = dir.path().join("index.db");

        let mut retriever = retriever_with(KeywordEmbedder::new(), Some(IndexCache::open(&db_path).unwrap()));
        retriever.ensure(&path).await.unwrap();

        let status = retriever.force_rebuild(&path).await.unwrap();
        assert_eq!(status, IndexStatus::Rebuilt { chunks: 3 });
    }

    #[tokio::test]
    async fn test_force_rebuild_clears_cache_before_embedding() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, CSV);
        let db_path = dir.path().join("index.db");

        let mut first = retriever_with(KeywordEmbedder::new(), Some(IndexCache::open(&db_path).unwrap()));
        first.ensure(&path).await.unwrap();
        assert!(first.cache().unwrap().meta().unwrap().is_some());

        let mut failing = retriever_with(Arc::new(FailingEmbedder), Some(IndexCache::open(&db_path).unwrap()));
        let result = failing.force_rebuild(&path).await;

        assert!(matches!(result, Err(AssistantError::Embedding(_))));
        assert!(failing.cache().unwrap().meta().unwrap().is_none());
        assert_eq!(failing.cache().unwrap().db_path(), db_path.as_path());
    }

    #[tokio::test]
    async fn test_invalidate_drops_index() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, CSV);
        let mut retriever = retriever_with(KeywordEmbedder::new(), None);
        retriever.ensure(&path).await.unwrap();

        retriever.invalidate();
        assert!(retriever.index().is_none());
        assert!(retriever.dataset().is_none());
        assert!(matches!(
            retriever.query("lightning", 3).await,
            Err(AssistantError::IndexUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_missing_dataset_is_load_error() {
        let mut retriever = retriever_with(KeywordEmbedder::new(), None);
        let result = retriever.ensure(Path::new("/nonexistent/data.csv")).await;
        assert!(matches!(result, Err(AssistantError::Load { .. })));
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_no_index() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, CSV);
        let mut retriever = retriever_with(Arc::new(FailingEmbedder), None);

        let result = retriever.ensure(&path).await;
        assert!(matches!(result, Err(AssistantError::Embedding(_))));
        assert!(retriever.index().is_none());
    }
}
