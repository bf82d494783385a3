//! LLM 모듈 - OpenRouter(OpenAI 호환) 채팅 완성 API
//!
//! 답변 생성과 후속 질문 생성에 사용하는 채팅 모델 인터페이스입니다.
//! 스트리밍과 재시도 없이 한 번 호출하고 결과를 그대로 반환합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let model = OpenRouterChat::from_settings(&settings)?;
//! let reply = model.complete(&ChatRequest::new(messages, 0.1)).await?;
//! ```

mod parser;

pub use parser::{ParsedResponse, ResponseParser};

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Settings, API_KEY_ENV};

// ============================================================================
// Types
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 채팅 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// 채팅 요청
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            messages,
            temperature,
        }
    }
}

// ============================================================================
// ChatModel Trait
// ============================================================================

/// 채팅 모델 트레이트
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 요청을 보내고 모델이 생성한 원문 텍스트를 반환
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// 모델 식별자
    fn model_name(&self) -> &str;
}

// ============================================================================
// OpenRouter Chat
// ============================================================================

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// OpenRouter 채팅 구현체
///
/// source: https://openrouter.ai/docs/api-reference/chat-completion
#[derive(Debug)]
pub struct OpenRouterChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    site_url: String,
    site_name: String,
    user_agent: String,
}

/// API 요청 본문
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

/// API 응답
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// API 에러 응답
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenRouterChat {
    /// 설정에서 생성
    ///
    /// API 키가 없으면 에러를 반환합니다.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.api_key.clone().with_context(|| {
            format!(
                "API key not found. Set {} or enter a key with /key",
                API_KEY_ENV
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.chat_base_url.trim_end_matches('/').to_string(),
            model: settings.chat_model.clone(),
            site_url: settings.site_url.clone(),
            site_name: settings.site_name.clone(),
            user_agent: settings.user_agent.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenRouterChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        tracing::debug!(
            "Chat request: model={}, messages={}, temperature={}",
            self.model,
            request.messages.len(),
            request.temperature
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .json(&body)
            .send()
            .await
            .context("Failed to send chat request")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&text) {
                anyhow::bail!("Chat API error ({}): {}", status, error.error.message);
            }
            anyhow::bail!("Chat API error ({}): {}", status, text);
        }

        let completion: CompletionResponse =
            serde_json::from_str(&text).context("Failed to parse chat response")?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .context("Chat response contained no choices")?
            .message
            .content
            .unwrap_or_default();

        if content.trim().is_empty() {
            tracing::warn!("Model {} returned an empty message", self.model);
        }

        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> Settings {
        let mut settings = Settings::default().with_api_key_override(Some("sk-test".to_string()));
        settings.chat_base_url = format!("{}/api/v1", server.uri());
        settings.chat_model = "test/model".to_string();
        settings
    }

    fn request() -> ChatRequest {
        ChatRequest::new(
            vec![
                ChatMessage::system("You are an analyst."),
                ChatMessage::user("What is Ark?"),
            ],
            0.1,
        )
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }

    #[test]
    fn test_missing_api_key() {
        let result = OpenRouterChat::from_settings(&Settings::default());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("OPENROUTER_API_KEY"));
    }

    #[tokio::test]
    async fn test_complete_sends_headers_and_reads_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("x-title", "Bitcoin L2 Research Assistant"))
            .and(header("http-referer", "localhost"))
            .and(body_partial_json(serde_json::json!({
                "model": "test/model",
                "messages": [
                    { "role": "system", "content": "You are an analyst." },
                    { "role": "user", "content": "What is Ark?" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "<think>hm</think>Ark is an L2." } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = OpenRouterChat::from_settings(&settings_for(&server)).unwrap();
        let reply = model.complete(&request()).await.unwrap();
        assert_eq!(reply, "<think>hm</think>Ark is an L2.");
        assert_eq!(model.model_name(), "test/model");
    }

    #[tokio::test]
    async fn test_api_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "No auth credentials found", "code": 401 }
            })))
            .mount(&server)
            .await;

        let model = OpenRouterChat::from_settings(&settings_for(&server)).unwrap();
        let err = model.complete(&request()).await.unwrap_err().to_string();
        assert!(err.contains("401"));
        assert!(err.contains("No auth credentials found"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let model = OpenRouterChat::from_settings(&settings_for(&server)).unwrap();
        assert!(model.complete(&request()).await.is_err());
    }
}
