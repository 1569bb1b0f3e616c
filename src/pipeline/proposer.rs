//! Model A: high-recall candidate extraction.

use std::collections::HashSet;

use crate::llm::{CompletionOptions, CompletionRequest, ModelRole, SharedClient};

use super::error::ConsensusError;
use super::grounding::SourceIndex;
use super::parser::{parse_proposal, ParsedProposal, RawCandidate};
use super::prompt::{build_extraction_prompt, build_strict_extraction_prompt, PROPOSER_SYSTEM_PROMPT};
use super::retry::RetryPolicy;
use super::sanitize::sanitize_for_prompt;
use super::types::CandidateParameter;

pub struct Proposer {
    client: SharedClient,
    options: CompletionOptions,
    retry: RetryPolicy,
}

impl Proposer {
    pub fn new(client: SharedClient, options: CompletionOptions, retry: RetryPolicy) -> Self {
        Self {
            client,
            options,
            retry,
        }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Propose candidates for one text or chunk. Blocking.
    ///
    /// Returned candidates are grounded in `text`, unique by `(name, excerpt)`
    /// and in proposer-emission order.
    pub fn propose(
        &self,
        text: &str,
        chunk_index: usize,
    ) -> Result<Vec<CandidateParameter>, ConsensusError> {
        let sanitized = sanitize_for_prompt(text, "proposer");

        let raw = match self.call_and_parse(build_extraction_prompt(&sanitized), chunk_index)? {
            ParsedProposal::Parsed(raw) => raw,
            ParsedProposal::Failed { reason, .. } => {
                tracing::warn!(
                    chunk_index,
                    reason = %reason,
                    "Proposer output unparseable, retrying with strict instruction"
                );
                match self.call_and_parse(build_strict_extraction_prompt(&sanitized), chunk_index)? {
                    ParsedProposal::Parsed(raw) => raw,
                    ParsedProposal::Failed { reason, .. } => {
                        return Err(ConsensusError::ProposalParse(reason));
                    }
                }
            }
        };

        let candidates = ground_and_dedup(text, raw, chunk_index);
        tracing::info!(
            chunk_index,
            candidates = candidates.len(),
            "Proposer returned grounded candidates"
        );
        Ok(candidates)
    }

    fn call_and_parse(
        &self,
        prompt: String,
        chunk_index: usize,
    ) -> Result<ParsedProposal, ConsensusError> {
        let request = CompletionRequest {
            system: PROPOSER_SYSTEM_PROMPT.trim().to_string(),
            prompt,
            options: self.options,
        };
        let context = format!("chunk {chunk_index}");
        let response = self
            .retry
            .run(ModelRole::Proposer, &context, || self.client.complete(&request))
            .map_err(|e| ConsensusError::from_provider(ModelRole::Proposer, e))?;
        Ok(parse_proposal(&response))
    }
}

/// Drop candidates whose excerpt is not in the source, then collapse
/// duplicates by `(name, excerpt)`, first occurrence wins.
fn ground_and_dedup(
    source: &str,
    raw: Vec<RawCandidate>,
    chunk_index: usize,
) -> Vec<CandidateParameter> {
    let index = SourceIndex::new(source);
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for candidate in raw {
        if !index.contains_excerpt(&candidate.excerpt) {
            tracing::info!(
                chunk_index,
                candidate = %candidate.name,
                "Dropped candidate: excerpt not found in source"
            );
            continue;
        }
        if !seen.insert((candidate.name.clone(), candidate.excerpt.clone())) {
            tracing::debug!(chunk_index, candidate = %candidate.name, "Dropped duplicate candidate");
            continue;
        }
        out.push(CandidateParameter::new(
            candidate.name,
            candidate.excerpt,
            candidate.category,
        ));
    }

    out
}
