//! Runtime abstractions for inference providers.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod providers;

pub use providers::WorkersAiProvider;

/// Role tag carried by every message sent to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated text; empty when the provider produced nothing.
    pub content: String,
    pub model: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("mock provider has no queued response")]
    MockQueueEmpty,
    #[error("provider error: {0}")]
    Message(String),
    #[error("provider configuration error: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("provider returned HTTP {status} with error {code}: {message}")]
    Api {
        status: u16,
        code: u32,
        message: String,
    },
    #[error("failed to decode provider response: {0}")]
    Decode(String),
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    /// Classify this failure into the stable kind surfaced to callers.
    ///
    /// Only text reported by the provider itself is matched. Local failures
    /// (transport, decode, timeout, configuration) are always `Unknown`, so
    /// URLs, account ids and model names never influence the result.
    pub fn kind(&self) -> ProviderErrorKind {
        match self.provider_text() {
            Some(text) => ProviderErrorKind::classify(&text),
            None => ProviderErrorKind::Unknown,
        }
    }

    fn provider_text(&self) -> Option<String> {
        match self {
            Self::Message(message) => Some(message.clone()),
            Self::HttpStatus { status, body } => Some(format!("{status} {body}")),
            Self::Api {
                status,
                code,
                message,
            } => Some(format!("{code} {status} {message}")),
            Self::MockQueueEmpty
            | Self::Config(_)
            | Self::Transport(_)
            | Self::Decode(_)
            | Self::Timeout(_) => None,
        }
    }
}

/// Stable failure taxonomy derived from provider error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    ModelUnavailable,
    RateLimited,
    QuotaExceeded,
    Unknown,
}

impl ProviderErrorKind {
    /// Match provider wording against known indicators. Order matters: a
    /// message mentioning both `5007` and `429` is a model availability error.
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("5007") {
            Self::ModelUnavailable
        } else if message.contains("rate limit") || message.contains("429") {
            Self::RateLimited
        } else if message.contains("usage") || message.contains("quota") {
            Self::QuotaExceeded
        } else {
            Self::Unknown
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::ModelUnavailable => {
                "AI model not available. This might be due to usage limits or model access restrictions."
            }
            Self::RateLimited => "Rate limit exceeded. Please wait a moment before trying again.",
            Self::QuotaExceeded => "Usage limit reached. Please check your Workers AI plan.",
            Self::Unknown => "Sorry, I encountered an error processing your request.",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelUnavailable => "model_unavailable",
            Self::RateLimited => "rate_limited",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Unknown => "unknown",
        }
    }
}

#[async_trait]
pub trait AIProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError>;
}

/// Scripted provider that replays queued results and records every request.
#[derive(Debug, Default)]
pub struct MockProvider {
    generate_queue: Mutex<VecDeque<Result<GenerateResponse, ProviderError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_generate(&self, result: Result<GenerateResponse, ProviderError>) {
        self.generate_queue
            .lock()
            .expect("mock generate queue poisoned")
            .push_back(result);
    }

    pub fn enqueue_reply(&self, content: impl Into<String>) {
        self.enqueue_generate(Ok(GenerateResponse {
            content: content.into(),
            model: Some("mock-1".to_string()),
        }));
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .clone()
    }
}

#[async_trait]
impl AIProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .push(req);
        self.generate_queue
            .lock()
            .expect("mock generate queue poisoned")
            .pop_front()
            .unwrap_or(Err(ProviderError::MockQueueEmpty))
    }
}
