//! 설정 모듈
//!
//! 환경변수에서 기본값을 읽고, CLI 플래그로 덮어씁니다.
//! API 키는 `OPENROUTER_API_KEY` 또는 사용자가 직접 입력한 값을 사용합니다.

use std::path::PathBuf;

// ============================================================================
// Defaults
// ============================================================================

/// 기본 검색 깊이 (k)
pub const DEFAULT_SEARCH_DEPTH: usize = 8;
pub const MIN_SEARCH_DEPTH: usize = 3;
pub const MAX_SEARCH_DEPTH: usize = 15;

/// 기본 후속 질문 개수
pub const DEFAULT_FOLLOWUP_COUNT: usize = 3;

/// OpenRouter (OpenAI 호환) 엔드포인트
/// ref: https://openrouter.ai/docs/api-reference/overview
pub const DEFAULT_CHAT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek/deepseek-r1-0528-qwen3-8b:free";

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

pub const DEFAULT_DATASET: &str = "data.csv";
pub const DEFAULT_SITE_URL: &str = "localhost";
pub const DEFAULT_SITE_NAME: &str = "Bitcoin L2 Research Assistant";
pub const DEFAULT_USER_AGENT: &str = "BitcoinL2ResearchAssistant/1.0";

/// API 키 환경변수
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

// ============================================================================
// Settings
// ============================================================================

/// 실행 설정
#[derive(Debug, Clone)]
pub struct Settings {
    /// CSV 데이터셋 경로
    pub dataset_path: PathBuf,
    /// 대화 기록, 피드백, 인덱스 캐시 저장 디렉토리
    pub data_dir: PathBuf,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub chat_base_url: String,
    pub site_url: String,
    pub site_name: String,
    pub user_agent: String,
    pub embedding_model: String,
    pub ollama_url: String,
    search_depth: usize,
    pub followup_count: usize,
}

impl Settings {
    /// 프로세스 환경변수에서 설정 로드
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 로드 (테스트용 주입 지점)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let search_depth = get("L2GPT_SEARCH_DEPTH")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(clamp_search_depth)
            .unwrap_or(DEFAULT_SEARCH_DEPTH);

        let followup_count = get("L2GPT_FOLLOWUPS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_FOLLOWUP_COUNT);

        Self {
            dataset_path: get("L2GPT_DATASET")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET)),
            data_dir: get("L2GPT_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(get_data_dir),
            api_key: get(API_KEY_ENV),
            chat_model: get("L2GPT_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            chat_base_url: get("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CHAT_BASE_URL.to_string()),
            site_url: get("YOUR_SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            site_name: get("YOUR_SITE_NAME").unwrap_or_else(|| DEFAULT_SITE_NAME.to_string()),
            user_agent: get("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            embedding_model: get("L2GPT_EMBED_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            ollama_url: get("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            search_depth,
            followup_count,
        }
    }

    /// 사용자 입력 API 키로 덮어쓰기 (빈 값은 무시)
    pub fn with_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
        self
    }

    pub fn search_depth(&self) -> usize {
        self.search_depth
    }

    /// 검색 깊이 설정 (3~15로 제한)
    pub fn set_search_depth(&mut self, depth: usize) {
        let clamped = clamp_search_depth(depth);
        if clamped != depth {
            tracing::warn!(
                "Search depth {} out of range, using {} ({}..={})",
                depth,
                clamped,
                MIN_SEARCH_DEPTH,
                MAX_SEARCH_DEPTH
            );
        }
        self.search_depth = clamped;
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// 대화 기록 디렉토리 (<data_dir>/chat_history)
    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("chat_history")
    }

    /// 피드백 디렉토리 (<data_dir>/chat_history/feedback)
    pub fn feedback_dir(&self) -> PathBuf {
        self.history_dir().join("feedback")
    }

    /// 인덱스 캐시 DB 경로
    pub fn index_db_path(&self) -> PathBuf {
        self.data_dir.join("index.db")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 검색 깊이를 허용 범위로 제한
pub fn clamp_search_depth(depth: usize) -> usize {
    depth.clamp(MIN_SEARCH_DEPTH, MAX_SEARCH_DEPTH)
}

/// 데이터 디렉토리 경로 (~/.local/share/l2gpt 등)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("l2gpt")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.search_depth(), DEFAULT_SEARCH_DEPTH);
        assert_eq!(settings.followup_count, DEFAULT_FOLLOWUP_COUNT);
        assert_eq!(settings.dataset_path, PathBuf::from("data.csv"));
        assert_eq!(settings.embedding_model, "nomic-embed-text");
        assert!(!settings.has_api_key());
    }

    #[test]
    fn test_from_lookup_reads_env() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("L2GPT_SEARCH_DEPTH", "12"),
            ("L2GPT_HOME", "/tmp/l2gpt-test"),
            ("OLLAMA_HOST", "http://ollama:11434"),
        ]));

        assert_eq!(settings.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.search_depth(), 12);
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/l2gpt-test"));
        assert_eq!(settings.ollama_url, "http://ollama:11434");
        assert_eq!(
            settings.history_dir(),
            PathBuf::from("/tmp/l2gpt-test/chat_history")
        );
    }

    #[test]
    fn test_search_depth_clamped() {
        let settings = Settings::from_lookup(lookup_from(&[("L2GPT_SEARCH_DEPTH", "40")]));
        assert_eq!(settings.search_depth(), MAX_SEARCH_DEPTH);

        let mut settings = Settings::default();
        settings.set_search_depth(1);
        assert_eq!(settings.search_depth(), MIN_SEARCH_DEPTH);
        settings.set_search_depth(10);
        assert_eq!(settings.search_depth(), 10);
    }

    #[test]
    fn test_api_key_override() {
        let settings = Settings::from_lookup(lookup_from(&[("OPENROUTER_API_KEY", "env-key")]));

        let overridden = settings.clone().with_api_key_override(Some("user-key".to_string()));
        assert_eq!(overridden.api_key.as_deref(), Some("user-key"));

        // 빈 값이면 환경변수 키 유지
        let kept = settings.with_api_key_override(Some("  ".to_string()));
        assert_eq!(kept.api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn test_empty_env_value_ignored() {
        let settings = Settings::from_lookup(lookup_from(&[("OPENROUTER_API_KEY", "")]));
        assert!(settings.api_key.is_none());
    }
}
