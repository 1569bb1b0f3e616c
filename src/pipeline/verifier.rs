//! Model B: independent accept/reject and confidence scoring.
//!
//! Verification fails closed: an unusable verifier answer becomes a
//! rejected verdict with zero confidence, never a retry loop and never an
//! aborted request. Provider errors (after the retry policy) still abort.

use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::sync::Semaphore;

use crate::config::VerificationMode;
use crate::llm::{CompletionOptions, CompletionRequest, ModelRole, SharedClient};

use super::error::ConsensusError;
use super::parser::{parse_batch_verdicts, parse_verdict, BatchVerdictEntry, ParsedVerdict, RawVerdict};
use super::prompt::{build_batch_verification_prompt, build_verification_prompt, VERIFIER_SYSTEM_PROMPT};
use super::retry::RetryPolicy;
use super::types::{CandidateParameter, VerificationVerdict};

pub struct Verifier {
    client: SharedClient,
    options: CompletionOptions,
    retry: RetryPolicy,
    threshold: f32,
    mode: VerificationMode,
}

impl Verifier {
    pub fn new(
        client: SharedClient,
        options: CompletionOptions,
        retry: RetryPolicy,
        threshold: f32,
        mode: VerificationMode,
    ) -> Self {
        Self {
            client,
            options,
            retry,
            threshold,
            mode,
        }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Verify every candidate of one chunk. One verdict per candidate, in
    /// candidate order regardless of completion order.
    ///
    /// `permits` bounds in-flight verifier calls; it is shared by all the
    /// chunks of one request.
    pub async fn verify_all(
        self: Arc<Self>,
        sanitized_source: Arc<str>,
        candidates: Vec<CandidateParameter>,
        permits: Arc<Semaphore>,
        chunk_index: usize,
    ) -> Result<Vec<VerificationVerdict>, ConsensusError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mode = self.mode;
        match mode {
            VerificationMode::Batch => {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ConsensusError::TaskFailed(e.to_string()))?;
                tokio::task::spawn_blocking(move || {
                    self.verify_batch(&sanitized_source, &candidates, chunk_index)
                })
                .await
                .map_err(|e| ConsensusError::TaskFailed(e.to_string()))?
            }
            VerificationMode::PerCandidate => {
                let tasks = candidates.into_iter().map(|candidate| {
                    let verifier = Arc::clone(&self);
                    let source = Arc::clone(&sanitized_source);
                    let permits = Arc::clone(&permits);
                    async move {
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|e| ConsensusError::TaskFailed(e.to_string()))?;
                        tokio::task::spawn_blocking(move || {
                            verifier.verify_one(&source, candidate, chunk_index)
                        })
                        .await
                        .map_err(|e| ConsensusError::TaskFailed(e.to_string()))?
                    }
                });
                try_join_all(tasks).await
            }
        }
    }

    /// Verify one candidate. Blocking.
    pub fn verify_one(
        &self,
        sanitized_source: &str,
        candidate: CandidateParameter,
        chunk_index: usize,
    ) -> Result<VerificationVerdict, ConsensusError> {
        let prompt = build_verification_prompt(sanitized_source, &candidate);
        let response = self.call(prompt, &candidate.name, chunk_index)?;

        Ok(match parse_verdict(&response) {
            ParsedVerdict::Parsed(raw) => self.to_verdict(candidate, raw),
            ParsedVerdict::Failed { reason, .. } => {
                tracing::warn!(
                    chunk_index,
                    candidate = %candidate.name,
                    reason = %reason,
                    "Verifier output unparseable, rejecting candidate"
                );
                VerificationVerdict::parse_failure(candidate)
            }
        })
    }

    /// Verify all candidates of a chunk in a single call. Blocking.
    ///
    /// Results are matched back by `id`, then by `(name, excerpt)`;
    /// candidates left unmatched fail closed.
    pub fn verify_batch(
        &self,
        sanitized_source: &str,
        candidates: &[CandidateParameter],
        chunk_index: usize,
    ) -> Result<Vec<VerificationVerdict>, ConsensusError> {
        let prompt = build_batch_verification_prompt(sanitized_source, candidates);
        let response = self.call(prompt, "batch", chunk_index)?;

        let entries = match parse_batch_verdicts(&response) {
            Ok(entries) => entries,
            Err(reason) => {
                tracing::warn!(
                    chunk_index,
                    candidates = candidates.len(),
                    reason = %reason,
                    "Batch verifier output unparseable, rejecting all candidates"
                );
                Vec::new()
            }
        };

        let mut used = vec![false; entries.len()];
        let verdicts = candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| match match_entry(&entries, &mut used, i, candidate) {
                Some(Ok(raw)) => self.to_verdict(candidate.clone(), raw),
                Some(Err(reason)) => {
                    tracing::warn!(chunk_index, candidate = %candidate.name, reason = %reason, "Batch verdict unusable");
                    VerificationVerdict::parse_failure(candidate.clone())
                }
                None => {
                    tracing::warn!(chunk_index, candidate = %candidate.name, "No batch verdict for candidate");
                    VerificationVerdict::parse_failure(candidate.clone())
                }
            })
            .collect();

        Ok(verdicts)
    }

    fn call(&self, prompt: String, context: &str, chunk_index: usize) -> Result<String, ConsensusError> {
        let request = CompletionRequest {
            system: VERIFIER_SYSTEM_PROMPT.trim().to_string(),
            prompt,
            options: self.options,
        };
        let context = format!("chunk {chunk_index}: {context}");
        self.retry
            .run(ModelRole::Verifier, &context, || self.client.complete(&request))
            .map_err(|e| ConsensusError::from_provider(ModelRole::Verifier, e))
    }

    /// Accepted only when the verifier said yes AND met the threshold.
    fn to_verdict(&self, candidate: CandidateParameter, raw: RawVerdict) -> VerificationVerdict {
        let accepted = raw.accepted && raw.confidence >= self.threshold;
        let corrected_category = raw.category.filter(|c| *c != candidate.category);

        let notes = if raw.accepted && !accepted {
            let below = format!("confidence below acceptance threshold {:.2}", self.threshold);
            Some(match raw.notes {
                Some(n) => format!("{n} ({below})"),
                None => below,
            })
        } else {
            raw.notes
        };

        tracing::debug!(
            candidate = %candidate.name,
            accepted,
            confidence = raw.confidence,
            "Verifier verdict"
        );

        VerificationVerdict {
            candidate,
            accepted,
            confidence: raw.confidence,
            notes,
            corrected_category,
        }
    }
}

fn match_entry(
    entries: &[BatchVerdictEntry],
    used: &mut [bool],
    position: usize,
    candidate: &CandidateParameter,
) -> Option<Result<RawVerdict, String>> {
    let same_identity = |e: &BatchVerdictEntry| {
        e.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(&candidate.name))
            && e.excerpt.as_deref().is_some_and(|x| x.eq_ignore_ascii_case(&candidate.excerpt))
    };

    let found = entries
        .iter()
        .enumerate()
        .find(|(i, e)| !used[*i] && e.index == Some(position))
        .or_else(|| {
            entries
                .iter()
                .enumerate()
                .find(|(i, e)| !used[*i] && e.index.is_none() && same_identity(e))
        })
        .map(|(i, _)| i)?;

    used[found] = true;
    Some(entries[found].verdict.clone())
}
