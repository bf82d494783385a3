//! 리서치 세션 - 한 사용자 상호작용 흐름의 전체 상태
//!
//! 설정, 검색기, 채팅 모델, 대화 메모리, 세션 저장소, 마지막 질의/응답을 한곳에 모읍니다.
//! 질의 하나는 `Idle → Retrieving → Generating → Parsing → Rendered` 순서로 진행되며
//! 어느 단계에서든 `Error`로 끝날 수 있습니다. 자동 재시도는 없습니다.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::config::{Settings, API_KEY_ENV};
use crate::error::{AssistantError, Result};
use crate::knowledge::{IndexStatus, Retriever, ScoredChunk};
use crate::llm::{ChatModel, OpenRouterChat};
use crate::storage::{self, Feedback, FeedbackKind, SessionStore};

use super::citations::{extract_citations, Citations};
use super::followup::FollowUpGenerator;
use super::generator::AnswerGenerator;
use super::memory::ConversationMemory;

/// 새 세션에 보여줄 예시 질문
pub const SAMPLE_QUESTIONS: &[&str] = &[
    "Compare trust assumptions of Tachi vs Lightning Network",
    "What consensus mechanisms are used by Bitcoin L2s?",
    "Which Bitcoin L2 solutions support smart contracts?",
    "How do fee structures differ across Bitcoin L2 networks?",
    "What's the maturity status of Bitcoin scaling solutions?",
    "How does Ark's onboarding compare to Liquid Network?",
];

// ============================================================================
// Types
// ============================================================================

/// 질의 처리 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Retrieving,
    Generating,
    Parsing,
    Rendered,
    Error,
}

/// 응답 묶음
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub response_id: String,
    pub query: String,
    pub answer: String,
    pub reasoning: String,
    pub context: Vec<ScoredChunk>,
    pub citations: Citations,
    pub processing_time: Duration,
    pub created_at: DateTime<Local>,
}

impl ResponseEnvelope {
    /// 분석한 청크 수
    pub fn sources_count(&self) -> usize {
        self.context.len()
    }
}

/// `ask` 결과
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Answered(ResponseEnvelope),
    /// 직전에 답변한 질문과 같아서 모델을 호출하지 않음
    Repeated,
    /// 빈 입력
    Ignored,
}

// ============================================================================
// ResearchSession
// ============================================================================

pub struct ResearchSession {
    id: String,
    settings: Settings,
    retriever: Retriever,
    model: Option<Arc<dyn ChatModel>>,
    memory: ConversationMemory,
    store: SessionStore,
    /// 마지막으로 성공한 질문 (중복 호출 방지)
    last_query: Option<String>,
    last_response: Option<ResponseEnvelope>,
    state: QueryState,
    followups: HashMap<String, Vec<String>>,
    history_loaded: bool,
}

impl ResearchSession {
    /// 구성 요소를 직접 지정하여 생성
    pub fn new(
        id: impl Into<String>,
        settings: Settings,
        retriever: Retriever,
        model: Option<Arc<dyn ChatModel>>,
    ) -> Result<Self> {
        let id = id.into();
        storage::validate_session_id(&id)?;
        let store = SessionStore::from_settings(&settings);

        Ok(Self {
            id,
            settings,
            retriever,
            model,
            memory: ConversationMemory::new(),
            store,
            last_query: None,
            last_response: None,
            state: QueryState::Idle,
            followups: HashMap::new(),
            history_loaded: false,
        })
    }

    /// 설정으로 생성 (Ollama 임베딩 + OpenRouter 모델)
    ///
    /// 세션 ID가 없으면 새로 만듭니다. API 키가 없어도 세션은 만들어지고,
    /// 질문할 때 `Generation` 에러가 납니다.
    pub fn from_settings(settings: Settings, session_id: Option<String>) -> Result<Self> {
        let retriever =
            Retriever::from_settings(&settings).map_err(|e| AssistantError::embedding(&e))?;
        let model = build_model(&settings)?;
        let id = session_id.unwrap_or_else(storage::new_session_id);
        Self::new(id, settings, retriever, model)
    }

    /// 저장된 대화 기록 로드(최초 1회) 후 인덱스 확인
    pub async fn initialize(&mut self) -> Result<IndexStatus> {
        self.load_history();
        self.ensure_index().await
    }

    /// 저장된 대화 기록 로드 (최초 1회, 읽을 수 없는 파일은 무시)
    pub fn load_history(&mut self) {
        if self.history_loaded {
            return;
        }

        match self.store.load_history(&self.id) {
            Ok(Some(entries)) => {
                self.memory = ConversationMemory::restore(entries);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Ignoring unreadable history for {}: {:#}", self.id, e);
            }
        }
        self.history_loaded = true;
    }

    /// 데이터셋 fingerprint 확인, 바뀌었으면 재빌드
    pub async fn ensure_index(&mut self) -> Result<IndexStatus> {
        let status = self.retriever.ensure(&self.settings.dataset_path).await?;
        match status {
            IndexStatus::Reused => tracing::debug!("Dataset unchanged, reusing index"),
            IndexStatus::LoadedFromCache { chunks } => {
                tracing::info!("Index restored from cache ({} chunks)", chunks)
            }
            IndexStatus::Rebuilt { chunks } => tracing::info!("Index rebuilt ({} chunks)", chunks),
        }
        Ok(status)
    }

    /// 인덱스 폐기
    pub fn invalidate(&mut self) {
        self.retriever.invalidate();
    }

    /// 캐시를 무시하고 강제 재빌드
    pub async fn rebuild(&mut self) -> Result<IndexStatus> {
        self.retriever.force_rebuild(&self.settings.dataset_path).await
    }

    /// 질문 처리
    pub async fn ask(&mut self, question: &str) -> Result<QueryOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(QueryOutcome::Ignored);
        }

        self.load_history();
        if self.last_query.as_deref() == Some(question) {
            tracing::debug!("Question already answered, skipping model call");
            return Ok(QueryOutcome::Repeated);
        }

        self.run_query(question).await.map(QueryOutcome::Answered)
    }

    /// 마지막 질문/답변을 지우고 다시 생성
    ///
    /// 실패하면 지운 질문/답변을 되돌립니다.
    pub async fn regenerate(&mut self) -> Result<ResponseEnvelope> {
        self.load_history();
        let question = self
            .memory
            .last_question()
            .map(str::to_string)
            .ok_or(AssistantError::NoPreviousQuery)?;

        let removed = self.memory.pop_last_turn().unwrap_or_default();

        match self.run_query(&question).await {
            Ok(envelope) => Ok(envelope),
            Err(e) => {
                self.memory.push_entries(removed);
                Err(e)
            }
        }
    }

    async fn run_query(&mut self, question: &str) -> Result<ResponseEnvelope> {
        self.state = QueryState::Idle;
        let result = self.process(question).await;

        self.state = match &result {
            Ok(_) => QueryState::Rendered,
            Err(e) => {
                tracing::warn!("Query failed: {}", e);
                QueryState::Error
            }
        };
        result
    }

    async fn process(&mut self, question: &str) -> Result<ResponseEnvelope> {
        let started = Instant::now();
        let model = self.model.clone().ok_or_else(missing_key_error)?;

        self.state = QueryState::Retrieving;
        self.ensure_index().await?;
        let context = self
            .retriever
            .query(question, self.settings.search_depth())
            .await?;

        self.state = QueryState::Generating;
        let generated = AnswerGenerator::new(model)
            .answer(question, &self.memory, context)
            .await?;

        self.state = QueryState::Parsing;
        let citations = extract_citations(&generated.context);

        self.memory.add_question(question);
        self.memory.add_answer(generated.answer.as_str());
        self.persist_history();

        let envelope = ResponseEnvelope {
            response_id: uuid::Uuid::new_v4().to_string(),
            query: question.to_string(),
            answer: generated.answer,
            reasoning: generated.reasoning,
            context: generated.context,
            citations,
            processing_time: started.elapsed(),
            created_at: Local::now(),
        };

        tracing::info!(
            "Answered in {:.2}s using {} chunks",
            envelope.processing_time.as_secs_f64(),
            envelope.sources_count()
        );

        self.last_query = Some(question.to_string());
        self.last_response = Some(envelope.clone());
        Ok(envelope)
    }

    /// 저장 실패는 답변을 무효화하지 않음
    fn persist_history(&self) {
        if let Err(e) = self.store.save_history(&self.id, self.memory.all()) {
            tracing::warn!("Failed to persist chat history: {:#}", e);
        }
    }

    /// 가장 최근 질문의 후속 질문 (질문별 캐시)
    pub async fn followups(&mut self) -> Vec<String> {
        let Some(question) = self.memory.last_question().map(str::to_string) else {
            return Vec::new();
        };

        if let Some(cached) = self.followups.get(&question) {
            return cached.clone();
        }

        let Some(model) = self.model.clone() else {
            return Vec::new();
        };

        let questions = FollowUpGenerator::new(model)
            .generate(&question, self.settings.followup_count)
            .await;

        if !questions.is_empty() {
            self.followups.insert(question, questions.clone());
        }
        questions
    }

    pub fn sample_questions(&self) -> &'static [&'static str] {
        SAMPLE_QUESTIONS
    }

    /// 마지막 질의에 대한 피드백 저장
    pub fn record_feedback(&self, kind: FeedbackKind, text: &str) -> Result<PathBuf> {
        self.record_feedback_for(kind, text, None)
    }

    /// 질의를 지정하여 피드백 저장 (없으면 마지막 질의)
    ///
    /// 부정 피드백은 내용이 필요합니다.
    pub fn record_feedback_for(
        &self,
        kind: FeedbackKind,
        text: &str,
        query: Option<&str>,
    ) -> Result<PathBuf> {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .or(self.last_query.as_deref())
            .or_else(|| self.memory.last_question())
            .ok_or(AssistantError::NoPreviousQuery)?;

        let text = text.trim();
        if kind == FeedbackKind::Negative && text.is_empty() {
            return Err(AssistantError::InvalidInput(
                "negative feedback needs a description of what was wrong".to_string(),
            ));
        }

        self.store
            .save_feedback(&Feedback::new(kind, text, query))
            .map_err(|e| AssistantError::storage(&e))
    }

    /// 대화 기록, 저장 파일, 마지막 응답 초기화
    pub fn clear(&mut self) -> Result<()> {
        self.memory.clear();
        self.last_query = None;
        self.last_response = None;
        self.followups.clear();
        self.state = QueryState::Idle;

        self.store
            .delete_history(&self.id)
            .map_err(|e| AssistantError::storage(&e))
    }

    /// 런타임 API 키 변경
    pub fn set_api_key(&mut self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AssistantError::InvalidInput("API key is empty".to_string()));
        }

        self.settings.api_key = Some(key.to_string());
        self.model = build_model(&self.settings)?;
        tracing::info!("API key updated");
        Ok(())
    }

    /// 검색 깊이 변경 (3~15로 제한), 적용된 값 반환
    pub fn set_search_depth(&mut self, depth: usize) -> usize {
        self.settings.set_search_depth(depth);
        self.settings.search_depth()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn last_response(&self) -> Option<&ResponseEnvelope> {
        self.last_response.as_ref()
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn build_model(settings: &Settings) -> Result<Option<Arc<dyn ChatModel>>> {
    if !settings.has_api_key() {
        tracing::debug!("No API key configured; generation disabled until one is set");
        return Ok(None);
    }

    let model = OpenRouterChat::from_settings(settings).map_err(|e| AssistantError::generation(&e))?;
    Ok(Some(Arc::new(model)))
}

fn missing_key_error() -> AssistantError {
    AssistantError::Generation(format!(
        "no API key configured; set {} or use /key",
        API_KEY_ENV
    ))
}

// ============================================================================
// Tests
// ============================================================================
