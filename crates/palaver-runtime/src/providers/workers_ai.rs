//! Cloudflare Workers AI Provider
//!
//! Implements the AIProvider trait for the Workers AI REST `ai/run` endpoint.
//! Error envelopes are flattened into [`ProviderError::Api`] so the numeric
//! error code and HTTP status survive into the classified error kind.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::{AIProvider, ChatMessage, GenerateRequest, GenerateResponse, ProviderError};

pub const WORKERS_AI_API_BASE: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_MODEL: &str = "@cf/meta/llama-3.3-70b-instruct-fp8-fast";
const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Workers AI Provider
#[derive(Debug)]
pub struct WorkersAiProvider {
    client: Client,
    account_id: String,
    api_token: String,
    base_url: String,
    default_model: String,
}

impl WorkersAiProvider {
    /// Create a provider from `CLOUDFLARE_ACCOUNT_ID`, `CLOUDFLARE_API_TOKEN`
    /// and the optional `WORKERS_AI_BASE` / `WORKERS_AI_MODEL` overrides.
    pub fn from_env() -> Result<Self, ProviderError> {
        let account_id = env::var("CLOUDFLARE_ACCOUNT_ID")
            .map_err(|_| ProviderError::Config("CLOUDFLARE_ACCOUNT_ID must be set".to_string()))?;
        let api_token = env::var("CLOUDFLARE_API_TOKEN")
            .map_err(|_| ProviderError::Config("CLOUDFLARE_API_TOKEN must be set".to_string()))?;

        let base_url =
            env::var("WORKERS_AI_BASE").unwrap_or_else(|_| WORKERS_AI_API_BASE.to_string());
        let default_model =
            env::var("WORKERS_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(account_id, api_token, base_url, default_model)
    }

    /// Create a provider with explicit configuration
    pub fn new(
        account_id: impl Into<String>,
        api_token: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            account_id: account_id.into(),
            api_token: api_token.into(),
            base_url: base_url.into(),
            default_model: default_model.into(),
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url.trim_end_matches('/'),
            self.account_id,
            model
        )
    }

    fn get_model(&self, req: &GenerateRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }
}

// ============================================================================
// Workers AI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

/// Envelope shared by success and failure responses
#[derive(Debug, Deserialize)]
struct RunEnvelope {
    #[serde(default)]
    success: bool,
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct RunResult {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u32,
    message: String,
}

fn api_failure(status: u16, errors: Vec<ApiError>, body: String) -> ProviderError {
    match errors.into_iter().next() {
        Some(first) => ProviderError::Api {
            status,
            code: first.code,
            message: first.message,
        },
        None => ProviderError::HttpStatus { status, body },
    }
}

#[async_trait]
impl AIProvider for WorkersAiProvider {
    fn name(&self) -> &'static str {
        "workers-ai"
    }

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let model = self.get_model(&req);
        let body = RunRequest {
            messages: &req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        };

        tracing::debug!(model = %model, messages = req.messages.len(), "calling Workers AI");

        let response = self
            .client
            .post(self.endpoint(&model))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            let errors = serde_json::from_str::<RunEnvelope>(&text)
                .map(|envelope| envelope.errors)
                .unwrap_or_default();
            return Err(api_failure(status.as_u16(), errors, text));
        }

        let envelope: RunEnvelope =
            serde_json::from_str(&text).map_err(|e| ProviderError::Decode(e.to_string()))?;

        if !envelope.success {
            return Err(api_failure(status.as_u16(), envelope.errors, text));
        }

        let content = envelope
            .result
            .and_then(|result| result.response)
            .unwrap_or_default();

        Ok(GenerateResponse {
            content,
            model: Some(model),
        })
    }
}
