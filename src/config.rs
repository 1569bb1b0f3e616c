//! Engine configuration.
//!
//! Credentials, model identifiers and pipeline constants live in one
//! immutable [`EngineConfig`] built at startup and shared read-only by every
//! request. Nothing in the pipeline reads the environment directly.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "paramconsensus";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name reported in every response's `strategy` field.
pub const STRATEGY_NAME: &str = "Dual-LLM Consensus";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,paramconsensus_lib=info,reqwest=warn,hyper=warn"
}

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Environment variable {name} has an invalid value '{value}'")]
    InvalidValue { name: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ──────────────────────────────────────────────
// Provider configuration
// ──────────────────────────────────────────────

/// Which wire protocol a model endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Generative Language `generateContent`.
    Gemini,
    /// OpenAI-style `/chat/completions` (Groq and compatible hosts).
    OpenAiCompatible,
    /// Local Ollama `/api/generate`.
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAiCompatible => "openai_compatible",
            Self::Ollama => "ollama",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Gemini => GEMINI_BASE_URL,
            Self::OpenAiCompatible => GROQ_BASE_URL,
            Self::Ollama => OLLAMA_BASE_URL,
        }
    }

    /// Hosted providers need an API key, local Ollama does not.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" | "openai_compatible" | "groq" => Ok(Self::OpenAiCompatible),
            "ollama" => Ok(Self::Ollama),
            other => Err(other.to_string()),
        }
    }
}

/// Connection and sampling settings for one model.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model identifier sent on the wire.
    pub model: String,
    /// Human-readable name reported as `model_a` / `model_b`.
    pub display_name: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call HTTP timeout.
    pub timeout_secs: u64,
}

// Keeps API keys out of debug logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("display_name", &self.display_name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Model A: high-context extraction.
    pub fn default_proposer() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            model: "gemini-flash-latest".into(),
            display_name: "Gemini 1.5 Flash".into(),
            base_url: GEMINI_BASE_URL.into(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 8192,
            timeout_secs: 120,
        }
    }

    /// Model B: strict verification from a different model family.
    pub fn default_verifier() -> Self {
        Self {
            kind: ProviderKind::OpenAiCompatible,
            model: "llama-3.1-8b-instant".into(),
            display_name: "Llama 3 70B".into(),
            base_url: GROQ_BASE_URL.into(),
            api_key: None,
            temperature: 0.1,
            max_tokens: 2048,
            timeout_secs: 60,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.kind.requires_api_key()
            || self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

// ──────────────────────────────────────────────
// Engine configuration
// ──────────────────────────────────────────────

/// How the verifier is called for a candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// One verifier call per candidate, run concurrently.
    PerCandidate,
    /// One verifier call listing every candidate of the chunk.
    Batch,
}

impl FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_candidate" | "per-candidate" | "single" => Ok(Self::PerCandidate),
            "batch" => Ok(Self::Batch),
            other => Err(other.to_string()),
        }
    }
}

/// Provider call retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before attempt n+1 is `backoff_ms * n`.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub proposer: ProviderConfig,
    pub verifier: ProviderConfig,
    /// Single-pass input limit (characters).
    pub max_input_chars: usize,
    pub min_input_chars: usize,
    /// Window size used by the chunked variant.
    pub chunk_chars: usize,
    pub chunk_overlap_chars: usize,
    /// Minimum verifier confidence for acceptance.
    pub acceptance_threshold: f32,
    pub verification_mode: VerificationMode,
    pub verifier_concurrency: usize,
    pub chunk_concurrency: usize,
    /// Whole-request deadline.
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            proposer: ProviderConfig::default_proposer(),
            verifier: ProviderConfig::default_verifier(),
            max_input_chars: 8000,
            min_input_chars: 10,
            chunk_chars: 6000,
            chunk_overlap_chars: 500,
            acceptance_threshold: 0.5,
            verification_mode: VerificationMode::PerCandidate,
            verifier_concurrency: 4,
            chunk_concurrency: 2,
            request_timeout_secs: 300,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, starting from defaults.
    ///
    /// Keys: `GEMINI_KEY` and `GROQ_KEY` are assigned to whichever role uses
    /// that provider kind. Unparseable values are errors, not defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        apply_provider_env(&mut config.proposer, "PROPOSER", &lookup)?;
        apply_provider_env(&mut config.verifier, "VERIFIER", &lookup)?;

        for provider in [&mut config.proposer, &mut config.verifier] {
            provider.api_key = match provider.kind {
                ProviderKind::Gemini => lookup("GEMINI_KEY"),
                ProviderKind::OpenAiCompatible => lookup("GROQ_KEY"),
                ProviderKind::Ollama => None,
            };
        }

        if let Some(v) = parse_var(&lookup, "CONSENSUS_THRESHOLD")? {
            config.acceptance_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "CONSENSUS_MAX_INPUT_CHARS")? {
            config.max_input_chars = v;
        }
        if let Some(v) = parse_var(&lookup, "CONSENSUS_CHUNK_CHARS")? {
            config.chunk_chars = v;
        }
        if let Some(v) = parse_var(&lookup, "CONSENSUS_CHUNK_OVERLAP")? {
            config.chunk_overlap_chars = v;
        }
        if let Some(v) = parse_var(&lookup, "CONSENSUS_VERIFIER_CONCURRENCY")? {
            config.verifier_concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, "CONSENSUS_CHUNK_CONCURRENCY")? {
            config.chunk_concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, "CONSENSUS_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "CONSENSUS_VERIFICATION_MODE")? {
            config.verification_mode = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(ConfigError::Invalid(format!(
                "acceptance threshold {} is outside [0, 1]",
                self.acceptance_threshold
            )));
        }
        if self.verifier_concurrency == 0 || self.chunk_concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency limits must be at least 1".into()));
        }
        if self.chunk_chars == 0 || self.chunk_overlap_chars >= self.chunk_chars {
            return Err(ConfigError::Invalid(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap_chars, self.chunk_chars
            )));
        }
        if self.min_input_chars > self.max_input_chars {
            return Err(ConfigError::Invalid("minimum input exceeds maximum input".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

fn apply_provider_env<F>(
    provider: &mut ProviderConfig,
    prefix: &str,
    lookup: &F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(kind) = parse_var::<ProviderKind, _>(lookup, &format!("{prefix}_PROVIDER"))? {
        if kind != provider.kind {
            provider.kind = kind;
            provider.base_url = kind.default_base_url().to_string();
        }
    }
    if let Some(model) = lookup(&format!("{prefix}_MODEL")) {
        provider.display_name = model.clone();
        provider.model = model;
    }
    if let Some(url) = lookup(&format!("{prefix}_BASE_URL")) {
        provider.base_url = url.trim_end_matches('/').to_string();
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acceptance_threshold, 0.5);
        assert_eq!(config.verification_mode, VerificationMode::PerCandidate);
    }

    #[test]
    fn keys_follow_provider_kind() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("GEMINI_KEY", "g-key"),
            ("GROQ_KEY", "q-key"),
        ]))
        .unwrap();
        assert_eq!(config.proposer.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.verifier.api_key.as_deref(), Some("q-key"));
        assert!(config.proposer.has_credentials());
    }

    #[test]
    fn switching_provider_resets_base_url() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("VERIFIER_PROVIDER", "ollama"),
            ("VERIFIER_MODEL", "llama3:8b"),
        ]))
        .unwrap();
        assert_eq!(config.verifier.kind, ProviderKind::Ollama);
        assert_eq!(config.verifier.base_url, OLLAMA_BASE_URL);
        assert_eq!(config.verifier.model, "llama3:8b");
        assert!(config.verifier.api_key.is_none());
        assert!(config.verifier.has_credentials());
    }

    #[test]
    fn numeric_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("CONSENSUS_THRESHOLD", "0.7"),
            ("CONSENSUS_CHUNK_OVERLAP", "250"),
            ("CONSENSUS_VERIFICATION_MODE", "batch"),
        ]))
        .unwrap();
        assert_eq!(config.acceptance_threshold, 0.7);
        assert_eq!(config.chunk_overlap_chars, 250);
        assert_eq!(config.verification_mode, VerificationMode::Batch);
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let err = EngineConfig::from_lookup(lookup_from(&[("CONSENSUS_THRESHOLD", "high")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "CONSENSUS_THRESHOLD".into(),
                value: "high".into()
            }
        );
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[("CONSENSUS_THRESHOLD", "1.5")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let config = EngineConfig {
            chunk_chars: 100,
            chunk_overlap_chars: 100,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let config = EngineConfig {
            verifier_concurrency: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_key_means_no_credentials() {
        let config = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(!config.proposer.has_credentials());
        assert!(!config.verifier.has_credentials());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let mut provider = ProviderConfig::default_proposer();
        provider.api_key = Some("super-secret".into());
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn provider_kind_aliases() {
        assert_eq!("groq".parse::<ProviderKind>(), Ok(ProviderKind::OpenAiCompatible));
        assert_eq!("Google".parse::<ProviderKind>(), Ok(ProviderKind::Gemini));
        assert!("bedrock".parse::<ProviderKind>().is_err());
    }
}
