//! 세션 저장소 - 대화 기록 및 피드백 파일
//!
//! - 대화 기록: `<data_dir>/chat_history/<session_id>.json` (메모리 엔트리 배열)
//! - 피드백: `<data_dir>/chat_history/feedback/<type>_<YYYYmmddHHMMSS>.json`

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::assistant::memory::{MemoryEntry, Speaker};
use crate::config::Settings;
use crate::error::AssistantError;

// ============================================================================
// Types
// ============================================================================

/// 피드백 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
}

impl FeedbackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackKind::Positive => "positive",
            FeedbackKind::Negative => "negative",
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 피드백 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub feedback: String,
    pub query: String,
}

impl Feedback {
    /// 현재 시각으로 생성
    pub fn new(kind: FeedbackKind, feedback: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            kind,
            feedback: feedback.into(),
            query: query.into(),
        }
    }
}

/// 저장된 세션 요약
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub questions: usize,
    pub modified: Option<DateTime<Local>>,
}

// ============================================================================
// SessionStore
// ============================================================================

/// 세션 파일 저장소
#[derive(Debug, Clone)]
pub struct SessionStore {
    history_dir: PathBuf,
    feedback_dir: PathBuf,
}

impl SessionStore {
    pub fn new(history_dir: impl Into<PathBuf>, feedback_dir: impl Into<PathBuf>) -> Self {
        Self {
            history_dir: history_dir.into(),
            feedback_dir: feedback_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.history_dir(), settings.feedback_dir())
    }

    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    pub fn history_path(&self, session_id: &str) -> PathBuf {
        self.history_dir.join(format!("{}.json", session_id))
    }

    /// 대화 기록 저장 (덮어쓰기)
    pub fn save_history(&self, session_id: &str, entries: &[MemoryEntry]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.history_dir)
            .context("Failed to create chat history directory")?;

        let path = self.history_path(session_id);
        let json = serde_json::to_string_pretty(entries).context("Failed to serialize history")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write history: {:?}", path))?;

        tracing::debug!("Saved {} memory entries to {:?}", entries.len(), path);
        Ok(path)
    }

    /// 대화 기록 로드 (파일이 없으면 None)
    pub fn load_history(&self, session_id: &str) -> Result<Option<Vec<MemoryEntry>>> {
        let path = self.history_path(session_id);
        if !path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read history: {:?}", path))?;
        let entries: Vec<MemoryEntry> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse history: {:?}", path))?;

        tracing::info!("Loaded {} memory entries from {:?}", entries.len(), path);
        Ok(Some(entries))
    }

    /// 대화 기록 삭제 (없으면 무시)
    pub fn delete_history(&self, session_id: &str) -> Result<()> {
        let path = self.history_path(session_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete history: {:?}", path))?;
        }
        Ok(())
    }

    /// 저장된 세션 목록 (최근 수정순)
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        if !self.history_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.history_dir).context("Failed to read history directory")? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let questions = match self.load_history(id) {
                Ok(Some(entries)) => entries.iter().filter(|e| e.speaker == Speaker::Human).count(),
                Ok(None) => 0,
                Err(e) => {
                    tracing::warn!("Skipping unreadable session {}: {:#}", id, e);
                    continue;
                }
            };

            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Local>::from);

            sessions.push(SessionSummary {
                id: id.to_string(),
                questions,
                modified,
            });
        }

        sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(sessions)
    }

    /// 피드백 저장
    ///
    /// 같은 초에 같은 종류의 파일이 이미 있으면 `_1`, `_2`... 접미사를 붙입니다.
    pub fn save_feedback(&self, feedback: &Feedback) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.feedback_dir)
            .context("Failed to create feedback directory")?;

        let stamp = Local::now().format("%Y%m%d%H%M%S");
        let base = format!("{}_{}", feedback.kind, stamp);

        let mut path = self.feedback_dir.join(format!("{}.json", base));
        let mut suffix = 1;
        while path.exists() {
            path = self.feedback_dir.join(format!("{}_{}.json", base, suffix));
            suffix += 1;
        }

        let json = serde_json::to_string_pretty(feedback).context("Failed to serialize feedback")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write feedback: {:?}", path))?;

        tracing::info!("Saved {} feedback to {:?}", feedback.kind, path);
        Ok(path)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 새 세션 ID
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 세션 ID 검증 (ASCII 영숫자, `-`, `_`만 허용)
pub fn validate_session_id(id: &str) -> crate::error::Result<()> {
    if id.is_empty() || id.len() > 128 {
        return Err(AssistantError::InvalidInput(
            "session id must be 1-128 characters".to_string(),
        ));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AssistantError::InvalidInput(format!(
            "session id {:?} may only contain letters, digits, '-' and '_'",
            id
        )));
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::memory::ConversationMemory;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let history = dir.path().join("chat_history");
        let store = SessionStore::new(&history, history.join("feedback"));
        (dir, store)
    }

    #[test]
    fn test_save_and_load_history() {
        let (_dir, store) = create_test_store();
        let mut memory = ConversationMemory::new();
        memory.add_question("What is Babylon?");
        memory.add_answer("A Bitcoin staking protocol.");

        let path = store.save_history("abc-123", memory.all()).unwrap();
        assert!(path.ends_with("chat_history/abc-123.json"));

        let loaded = store.load_history("abc-123").unwrap().unwrap();
        assert_eq!(loaded, memory.all());
    }

    #[test]
    fn test_history_file_format() {
        let (_dir, store) = create_test_store();
        let mut memory = ConversationMemory::new();
        memory.add_question("q");

        let path = store.save_history("s1", memory.all()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value, serde_json::json!([{ "type": "human", "content": "q" }]));
    }

    #[test]
    fn test_load_missing_history() {
        let (_dir, store) = create_test_store();
        assert!(store.load_history("nope").unwrap().is_none());
    }

    #[test]
    fn test_delete_history() {
        let (_dir, store) = create_test_store();
        store.save_history("s1", &[]).unwrap();
        store.delete_history("s1").unwrap();
        assert!(store.load_history("s1").unwrap().is_none());
        // 두 번째 삭제도 성공
        store.delete_history("s1").unwrap();
    }

    #[test]
    fn test_list_sessions() {
        let (_dir, store) = create_test_store();
        assert!(store.list_sessions().unwrap().is_empty());

        let mut memory = ConversationMemory::new();
        memory.add_question("one");
        memory.add_answer("1");
        memory.add_question("two");
        store.save_history("s1", memory.all()).unwrap();
        store.save_history("s2", &[]).unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        let s1 = sessions.iter().find(|s| s.id == "s1").unwrap();
        assert_eq!(s1.questions, 2);
    }

    #[test]
    fn test_save_feedback() {
        let (_dir, store) = create_test_store();
        let feedback = Feedback::new(FeedbackKind::Negative, "missing fee data", "Compare fees");

        let path = store.save_feedback(&feedback).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("negative_"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["type"], "negative");
        assert_eq!(value["feedback"], "missing fee data");
        assert_eq!(value["query"], "Compare fees");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_feedback_never_overwrites() {
        let (_dir, store) = create_test_store();
        let feedback = Feedback::new(FeedbackKind::Positive, "", "q");

        let paths: Vec<PathBuf> = (0..3).map(|_| store.save_feedback(&feedback).unwrap()).collect();
        assert_ne!(paths[0], paths[1]);
        assert_ne!(paths[1], paths[2]);
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("default").is_ok());
        assert!(validate_session_id(&new_session_id()).is_ok());
        assert!(validate_session_id("my_session-2").is_ok());

        assert!(matches!(
            validate_session_id("../etc/passwd"),
            Err(AssistantError::InvalidInput(_))
        ));
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("has space").is_err());
    }
}
