//! Generative backends
//!
//! The synthesizer only needs "prompt in, text out". [`OpenAiCompatibleBackend`]
//! speaks the chat-completions wire format; [`CannedBackend`] replays a fixed
//! reply and is used for offline runs and tests.

use crate::error::CoachError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub const ENV_BASE_URL: &str = "COACH_LLM_BASE_URL";
pub const ENV_MODEL: &str = "COACH_LLM_MODEL";
pub const ENV_API_KEY: &str = "COACH_LLM_API_KEY";

/// One generation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Generation timed out after {0}s")]
    Timeout(u64),

    #[error("No API key configured")]
    MissingApiKey,
}

impl From<BackendError> for CoachError {
    fn from(err: BackendError) -> Self {
        CoachError::UpstreamGeneration(err.to_string())
    }
}

/// Text generation service
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError>;

    /// Short identifier used in logs
    fn name(&self) -> &str;
}

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }
}

impl BackendSettings {
    /// Settings from `COACH_LLM_*` variables, falling back to defaults
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            base_url: var(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: var(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: var(ENV_API_KEY),
        }
    }
}

/// Chat-completions client
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    settings: BackendSettings,
    api_key: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(BackendError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    pub fn from_env() -> Result<Self, BackendError> {
        Self::new(BackendSettings::from_env())
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiCompatibleBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let data: serde_json::Value = response.json().await?;
        extract_content(&data)
    }

    fn name(&self) -> &str {
        "openai_compatible"
    }
}

/// Pull the first choice's message text out of a chat-completions body
pub fn extract_content(data: &serde_json::Value) -> Result<String, BackendError> {
    data["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BackendError::MalformedResponse("missing choices[0].message.content".into()))
}

/// What a [`CannedBackend`] does when called
#[derive(Debug, Clone)]
pub enum CannedReply {
    Text(String),
    Fail(String),
    /// Sleep, then reply
    Delayed(Duration, String),
}

/// Backend that replays a fixed reply
#[derive(Debug, Clone)]
pub struct CannedBackend {
    reply: CannedReply,
}

impl CannedBackend {
    pub fn new(reply: CannedReply) -> Self {
        Self { reply }
    }

    pub fn text(reply: impl Into<String>) -> Self {
        Self::new(CannedReply::Text(reply.into()))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(CannedReply::Fail(message.into()))
    }
}

#[async_trait]
impl GenerativeBackend for CannedBackend {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, BackendError> {
        match &self.reply {
            CannedReply::Text(text) => Ok(text.clone()),
            CannedReply::Fail(message) => Err(BackendError::MalformedResponse(message.clone())),
            CannedReply::Delayed(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
        }
    }

    fn name(&self) -> &str {
        "canned"
    }
}
