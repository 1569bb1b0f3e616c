//! Request-level error taxonomy.
//!
//! Zero proposed candidates is deliberately absent: it is reported as a
//! zero-count [`ConsensusReport`](super::ConsensusReport), not raised.
//! Verification parse failures never reach this type either; they are
//! recovered as rejected verdicts.

use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::{ModelRole, ProviderError};

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Input text too short for extraction (< {min} characters)")]
    InputTooShort { min: usize },

    #[error("Input is {len} characters, above the single-pass limit of {limit}; use chunked extraction")]
    InputTooLarge { len: usize, limit: usize },

    #[error("Proposer output could not be parsed after retry: {0}")]
    ProposalParse(String),

    #[error("The {role} model is unavailable: {source}")]
    ProviderTransport {
        role: ModelRole,
        #[source]
        source: ProviderError,
    },

    #[error("The {role} model is rate limited")]
    ProviderRateLimited {
        role: ModelRole,
        retry_after_secs: Option<u64>,
    },

    #[error("The {role} model rejected the request: {source}")]
    ProviderRejected {
        role: ModelRole,
        #[source]
        source: ProviderError,
    },

    #[error("Extraction did not finish within {0} seconds")]
    DeadlineExceeded(u64),

    #[error("Verdict list does not line up with candidate list: {0}")]
    VerdictMismatch(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline task failed: {0}")]
    TaskFailed(String),
}

impl ConsensusError {
    /// Attach the calling role to a provider failure.
    pub fn from_provider(role: ModelRole, err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited { retry_after_secs } => Self::ProviderRateLimited {
                role,
                retry_after_secs,
            },
            e if e.is_transient() => Self::ProviderTransport { role, source: e },
            e => Self::ProviderRejected { role, source: e },
        }
    }

    /// Status code an HTTP front end should map this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InputTooShort { .. } => 400,
            Self::InputTooLarge { .. } => 413,
            Self::ProposalParse(_) => 502,
            Self::ProviderTransport { .. } => 503,
            Self::ProviderRateLimited { .. } => 429,
            Self::ProviderRejected { .. } => 502,
            Self::DeadlineExceeded(_) => 504,
            Self::Config(_) => 503,
            Self::VerdictMismatch(_) | Self::TaskFailed(_) => 500,
        }
    }
}
