//! 에러 타입
//!
//! 질의 한 건의 실패는 상호작용 경계(CLI)에서 잡아서 출력하고,
//! 프로세스는 계속 실행됩니다.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// 데이터셋 파일이 없거나 파싱 불가 (초기화 실패)
    #[error("failed to load dataset {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// 인덱스 빌드 전에 검색 시도
    #[error("vector index is not available; build it before querying")]
    IndexUnavailable,

    /// 임베딩 서비스 호출 실패
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// 모델 호출 실패 또는 API 키 없음 (메모리는 변경되지 않음)
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("no previous query to act on")]
    NoPreviousQuery,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl AssistantError {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// anyhow 체인을 한 줄로 펼쳐서 Generation 에러 생성
    pub(crate) fn generation(err: &anyhow::Error) -> Self {
        Self::Generation(format!("{:#}", err))
    }

    pub(crate) fn embedding(err: &anyhow::Error) -> Self {
        Self::Embedding(format!("{:#}", err))
    }

    pub(crate) fn storage(err: &anyhow::Error) -> Self {
        Self::Storage(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_message() {
        let err = AssistantError::load("data.csv", "file not found");
        let msg = err.to_string();
        assert!(msg.contains("data.csv"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_generation_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("chat request failed");
        let err = AssistantError::generation(&inner);
        let msg = err.to_string();
        assert!(msg.contains("chat request failed"));
        assert!(msg.contains("connection refused"));
    }
}
