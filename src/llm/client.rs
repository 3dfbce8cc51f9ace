//! OpenAI-compatible chat-completions client.
//!
//! Works against OpenRouter by default, and against any endpoint that
//! speaks the same `/chat/completions` schema (LiteLLM proxies, vLLM,
//! Ollama) by overriding the API base.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for a chat completion.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token accounting reported by the endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Response to a chat completion request.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl GenerationResponse {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Abstraction over LLM backends, implemented by the HTTP client and by
/// scripted providers in tests.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP client for OpenAI-compatible chat-completions endpoints.
pub struct ChatClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: reqwest::Client,
}

impl ChatClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            http_client,
        }
    }

    /// Builds a client from `LLM_API_BASE`, `OPENROUTER_API_KEY` and
    /// `LLM_MODEL`. A key is required unless the API base was overridden
    /// to point at a local endpoint.
    pub fn from_env(default_model: impl Into<String>) -> Result<Self, LlmError> {
        let api_base =
            std::env::var("LLM_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = std::env::var("OPENROUTER_API_KEY").ok();
        if api_key.is_none() && api_base == DEFAULT_API_BASE {
            return Err(LlmError::MissingApiKey);
        }
        let model =
            std::env::var("LLM_MODEL").unwrap_or_else(|_| default_model.into());
        Ok(Self::new(api_base, api_key, model))
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[async_trait]
impl LlmProvider for ChatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let mut request = request;
        if request.model.is_empty() {
            request.model = self.default_model.clone();
        }

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let url = format!("{}/chat/completions", self.api_base);
        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {key}"));
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))
    }
}
