//! Request entry points: single-pass and chunked extraction.
//!
//! Each request is independent. The engine holds only the immutable
//! configuration and the two clients; semaphores and spans are per request.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{ConfigError, EngineConfig, ProviderConfig};
use crate::llm::{build_client, CompletionOptions, ModelRole, SharedClient};

use super::chunker::split_into_windows;
use super::consensus::{build_report, check_alignment, merge, merge_windows};
use super::error::ConsensusError;
use super::proposer::Proposer;
use super::retry::RetryPolicy;
use super::sanitize::sanitize_for_prompt;
use super::types::{
    CandidateParameter, ConsensusReport, EngineStatus, ExtractionResponse, ModelStatus,
    VerificationVerdict,
};
use super::verifier::Verifier;

/// Name reported by the health check.
pub const SYSTEM_NAME: &str = "Dual-LLM Consensus Engine";

/// The dual-model propose/verify/merge pipeline.
///
/// Built from real provider clients with [`ConsensusEngine::from_config`]
/// (outside any async runtime: the HTTP clients are blocking) or from
/// arbitrary clients with [`ConsensusEngine::with_clients`].
pub struct ConsensusEngine {
    config: Arc<EngineConfig>,
    proposer: Arc<Proposer>,
    verifier: Arc<Verifier>,
}

impl ConsensusEngine {
    pub fn from_config(config: EngineConfig) -> Result<Self, ConsensusError> {
        config.validate()?;
        let proposer = connect(&config.proposer, ModelRole::Proposer)?;
        let verifier = connect(&config.verifier, ModelRole::Verifier)?;
        Self::with_clients(config, proposer, verifier)
    }

    pub fn with_clients(
        config: EngineConfig,
        proposer: SharedClient,
        verifier: SharedClient,
    ) -> Result<Self, ConsensusError> {
        config.validate()?;
        let retry = RetryPolicy::from_config(&config.retry);

        let proposer = Proposer::new(proposer, options_for(&config.proposer), retry);
        let verifier = Verifier::new(
            verifier,
            options_for(&config.verifier),
            retry,
            config.acceptance_threshold,
            config.verification_mode,
        );

        Ok(Self {
            config: Arc::new(config),
            proposer: Arc::new(proposer),
            verifier: Arc::new(verifier),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Configuration health. Makes no network calls.
    pub fn status(&self) -> EngineStatus {
        engine_status(&self.config)
    }

    /// Wrap a report in the wire response, naming both models.
    pub fn response(&self, report: &ConsensusReport) -> ExtractionResponse {
        ExtractionResponse::from_report(
            report,
            &self.config.proposer.display_name,
            &self.config.verifier.display_name,
        )
    }

    /// Single-pass extraction. Fails with `InputTooLarge` above the limit.
    pub async fn extract(&self, text: &str) -> Result<ConsensusReport, ConsensusError> {
        let input_chars = self.check_min_length(text)?;
        if input_chars > self.config.max_input_chars {
            return Err(ConsensusError::InputTooLarge {
                len: input_chars,
                limit: self.config.max_input_chars,
            });
        }

        let span = request_span(false);
        let text: Arc<str> = Arc::from(text);
        self.with_deadline(
            async move {
                tracing::info!(input_chars, "Extraction started");
                let permits = Arc::new(Semaphore::new(self.config.verifier_concurrency));
                let (candidates, verdicts) = self.run_pass(text, 0, permits).await?;
                let report = merge(&candidates, &verdicts)?;
                log_report(&report);
                Ok(report)
            }
            .instrument(span),
        )
        .await
    }

    /// Extraction that splits input above the single-pass limit into
    /// overlapping windows and merges the per-window results.
    pub async fn extract_chunked(&self, text: &str) -> Result<ConsensusReport, ConsensusError> {
        let input_chars = self.check_min_length(text)?;
        if input_chars <= self.config.max_input_chars {
            return self.extract(text).await;
        }

        let span = request_span(true);
        let windows = split_into_windows(
            text,
            self.config.chunk_chars,
            self.config.chunk_overlap_chars,
        );
        self.with_deadline(
            async move {
                tracing::info!(input_chars, windows = windows.len(), "Chunked extraction started");
                let window_count = windows.len();
                let chunk_permits = Arc::new(Semaphore::new(self.config.chunk_concurrency));
                let verifier_permits = Arc::new(Semaphore::new(self.config.verifier_concurrency));

                let tasks = windows.into_iter().map(|chunk| {
                    let chunk_permits = Arc::clone(&chunk_permits);
                    let verifier_permits = Arc::clone(&verifier_permits);
                    async move {
                        let _permit = chunk_permits
                            .acquire_owned()
                            .await
                            .map_err(|e| ConsensusError::TaskFailed(e.to_string()))?;
                        tracing::debug!(
                            chunk_index = chunk.index,
                            offset = chunk.offset,
                            "Processing window"
                        );
                        let (candidates, verdicts) = self
                            .run_pass(Arc::from(chunk.content), chunk.index, verifier_permits)
                            .await?;
                        check_alignment(&candidates, &verdicts)?;
                        Ok::<_, ConsensusError>(verdicts)
                    }
                });

                let per_window = try_join_all(tasks).await?;
                let merged = merge_windows(per_window);
                let report = build_report(&merged, window_count);
                log_report(&report);
                Ok(report)
            }
            .instrument(span),
        )
        .await
    }

    /// [`extract`](Self::extract) for callers without an async runtime.
    /// Must not be called from inside one.
    pub fn extract_blocking(&self, text: &str) -> Result<ConsensusReport, ConsensusError> {
        let rt = blocking_runtime()?;
        let result = rt.block_on(self.extract(text));
        // Abandoned provider calls past the deadline must not hold the caller.
        rt.shutdown_background();
        result
    }

    /// [`extract_chunked`](Self::extract_chunked) for callers without an
    /// async runtime. Must not be called from inside one.
    pub fn extract_chunked_blocking(&self, text: &str) -> Result<ConsensusReport, ConsensusError> {
        let rt = blocking_runtime()?;
        let result = rt.block_on(self.extract_chunked(text));
        rt.shutdown_background();
        result
    }

    /// Propose then verify one text or window.
    async fn run_pass(
        &self,
        text: Arc<str>,
        chunk_index: usize,
        verifier_permits: Arc<Semaphore>,
    ) -> Result<(Vec<CandidateParameter>, Vec<VerificationVerdict>), ConsensusError> {
        let proposer = Arc::clone(&self.proposer);
        let source = Arc::clone(&text);
        let candidates = tokio::task::spawn_blocking(move || proposer.propose(&source, chunk_index))
            .await
            .map_err(|e| ConsensusError::TaskFailed(e.to_string()))??;

        if candidates.is_empty() {
            tracing::info!(chunk_index, "No candidates proposed");
            return Ok((candidates, Vec::new()));
        }

        let sanitized: Arc<str> = Arc::from(sanitize_for_prompt(&text, "verifier"));
        let verdicts = Arc::clone(&self.verifier)
            .verify_all(sanitized, candidates.clone(), verifier_permits, chunk_index)
            .await?;
        Ok((candidates, verdicts))
    }

    fn check_min_length(&self, text: &str) -> Result<usize, ConsensusError> {
        if text.trim().chars().count() < self.config.min_input_chars {
            return Err(ConsensusError::InputTooShort {
                min: self.config.min_input_chars,
            });
        }
        Ok(text.chars().count())
    }

    async fn with_deadline<F>(&self, work: F) -> Result<ConsensusReport, ConsensusError>
    where
        F: std::future::Future<Output = Result<ConsensusReport, ConsensusError>>,
    {
        let secs = self.config.request_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), work).await {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Extraction failed");
                }
                result
            }
            Err(_) => {
                tracing::error!(timeout_secs = secs, "Extraction deadline exceeded");
                Err(ConsensusError::DeadlineExceeded(secs))
            }
        }
    }
}

fn connect(config: &ProviderConfig, role: ModelRole) -> Result<SharedClient, ConsensusError> {
    build_client(config).map_err(|e| {
        ConsensusError::Config(ConfigError::Invalid(format!("{role} client: {e}")))
    })
}

fn options_for(provider: &ProviderConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: provider.temperature,
        max_tokens: provider.max_tokens,
    }
}

fn request_span(chunked: bool) -> tracing::Span {
    let request_id = Uuid::new_v4();
    tracing::info_span!("extract", request_id = %request_id, chunked)
}

fn log_report(report: &ConsensusReport) {
    tracing::info!(
        proposed = report.proposed_count,
        validated = report.validated_count,
        rejected = report.rejected_count,
        category_corrections = report.category_corrections,
        chunks = report.chunks_processed,
        "Extraction complete"
    );
}

fn blocking_runtime() -> Result<tokio::runtime::Runtime, ConsensusError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ConsensusError::TaskFailed(format!("runtime setup failed: {e}")))
}

/// Health of the configured collaborators, without network calls.
pub fn engine_status(config: &EngineConfig) -> EngineStatus {
    let model = |p: &ProviderConfig| ModelStatus {
        name: p.display_name.clone(),
        model: p.model.clone(),
        provider: p.kind.as_str(),
        configured: p.has_credentials(),
    };
    let proposer = model(&config.proposer);
    let verifier = model(&config.verifier);

    EngineStatus {
        status: if proposer.configured && verifier.configured {
            "online"
        } else {
            "degraded"
        },
        system: SYSTEM_NAME,
        proposer,
        verifier,
    }
}
