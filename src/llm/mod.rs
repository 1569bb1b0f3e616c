//! Model collaborators: the two hosted text-completion endpoints the
//! pipeline talks to, behind one blocking trait so they can be mocked.
//!
//! The pipeline never depends on provider request/response shapes. A client
//! returns text or a [`ProviderError`]; everything else is the client's job.

pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod openai_compat;

pub use gemini::GeminiClient;
pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
pub use openai_compat::OpenAiCompatClient;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};

// ──────────────────────────────────────────────
// Request types
// ──────────────────────────────────────────────

/// Sampling options forwarded to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature. Low values keep extraction reproducible.
    pub temperature: f32,
    /// Maximum tokens in the generated response.
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 4096,
        }
    }
}

/// One completion call: a system framing plus the user prompt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub options: CompletionOptions,
}

/// The role a model serves in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// High-recall candidate extraction (model A).
    Proposer,
    /// Independent accept/reject and confidence scoring (model B).
    Verifier,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposer => "proposer",
            Self::Verifier => "verifier",
        }
    }
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Error taxonomy
// ──────────────────────────────────────────────

/// Failure talking to a model provider.
///
/// Messages never echo the prompt: only status codes and the provider's
/// own error text.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Could not reach provider at {0}")]
    Connection(String),

    #[error("Provider returned a server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Provider rate limit reached")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Provider rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Provider response body was malformed: {0}")]
    MalformedBody(String),

    #[error("No API key configured for {0}")]
    MissingCredential(String),
}

impl ProviderError {
    /// Timeouts, connection failures and 5xx are worth one more attempt.
    /// 4xx (including 429) are configuration or input problems.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::Server { .. }
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: String, retry_after_secs: Option<u64>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after_secs },
            500..=599 => Self::Server { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    /// Classify a reqwest transport error.
    pub fn from_transport(err: &reqwest::Error, endpoint: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if err.is_connect() {
            Self::Connection(endpoint.to_string())
        } else if err.is_decode() {
            Self::MalformedBody(err.to_string())
        } else {
            Self::Connection(format!("{endpoint}: {err}"))
        }
    }
}

// ──────────────────────────────────────────────
// Client trait
// ──────────────────────────────────────────────

/// Opaque text-completion endpoint (allows mocking).
pub trait LlmClient: Send + Sync {
    /// Run one completion and return the raw response text.
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    /// Model identifier sent to the provider.
    fn model_name(&self) -> &str;
}

/// Shared handle used across blocking tasks.
pub type SharedClient = Arc<dyn LlmClient>;

/// Build the client described by a provider configuration.
pub fn build_client(config: &ProviderConfig) -> Result<SharedClient, ProviderError> {
    let client: SharedClient = match config.kind {
        ProviderKind::Gemini => Arc::new(GeminiClient::new(config)?),
        ProviderKind::OpenAiCompatible => Arc::new(OpenAiCompatClient::new(config)?),
        ProviderKind::Ollama => Arc::new(OllamaClient::new(config)?),
    };
    Ok(client)
}

/// Build the blocking HTTP client shared by the provider implementations.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, ProviderError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::Connection(format!("HTTP client setup failed: {e}")))
}

/// Turn a non-success blocking response into a classified error.
pub(crate) fn error_from_response(response: reqwest::blocking::Response) -> ProviderError {
    let status = response.status().as_u16();
    let retry_after_secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    let body = response.text().unwrap_or_default();
    ProviderError::from_status(status, truncate_message(&body), retry_after_secs)
}

/// Provider error bodies can be large; keep the first 300 chars.
fn truncate_message(body: &str) -> String {
    const MAX: usize = 300;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
