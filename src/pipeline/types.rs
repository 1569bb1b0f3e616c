use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::STRATEGY_NAME;

// ═══════════════════════════════════════════
// Candidates
// ═══════════════════════════════════════════

/// Kind of architectural parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Has a formal name in the text (XLEN, misa, MXL).
    Named,
    /// Varies by implementation choice (WARL fields, optional features).
    ConfigDependent,
    /// A concrete number, width or range.
    Numeric,
    /// Anything else, including unnamed constraints.
    #[serde(alias = "Unnamed")]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Named => "Named",
            Self::ConfigDependent => "ConfigDependent",
            Self::Numeric => "Numeric",
            Self::Other => "Other",
        }
    }

    /// Lenient match on model output: case, spacing and separators ignored.
    /// Unknown labels become `Other`.
    pub fn parse_lenient(raw: &str) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "named" => Self::Named,
            "configdependent" | "config" => Self::ConfigDependent,
            "numeric" | "number" => Self::Numeric,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter proposed by model A. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateParameter {
    pub name: String,
    /// Verbatim (case/whitespace-normalized) substring of the source text.
    pub excerpt: String,
    pub category: Category,
}

impl CandidateParameter {
    pub fn new(name: impl Into<String>, excerpt: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            excerpt: excerpt.into(),
            category,
        }
    }

    /// Identity used for de-duplication.
    pub fn identity(&self) -> (&str, &str) {
        (&self.name, &self.excerpt)
    }
}

// ═══════════════════════════════════════════
// Verdicts
// ═══════════════════════════════════════════

/// Model B's judgement on one candidate. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub candidate: CandidateParameter,
    /// Verifier said yes AND confidence met the threshold.
    pub accepted: bool,
    /// In [0, 1].
    pub confidence: f32,
    pub notes: Option<String>,
    /// Category the verifier believes is correct, when it differs.
    pub corrected_category: Option<Category>,
}

/// Notes attached to a verdict whose response could not be parsed.
pub const VERIFICATION_PARSE_FAILURE: &str = "verification parse failure";

impl VerificationVerdict {
    /// Fail-closed verdict used when the verifier's answer is unusable.
    pub fn parse_failure(candidate: CandidateParameter) -> Self {
        Self {
            candidate,
            accepted: false,
            confidence: 0.0,
            notes: Some(VERIFICATION_PARSE_FAILURE.to_string()),
            corrected_category: None,
        }
    }

    /// Category to report: the verifier's correction when present.
    pub fn effective_category(&self) -> Category {
        self.corrected_category.unwrap_or(self.candidate.category)
    }
}

// ═══════════════════════════════════════════
// Report
// ═══════════════════════════════════════════

/// One validated parameter in the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportItem {
    pub candidate: CandidateParameter,
    /// Category after verifier correction.
    pub category: Category,
    pub confidence: f32,
    pub notes: Option<String>,
}

/// Final merged result of one extraction request.
///
/// Invariant: `validated_count + rejected_count == proposed_count`, and
/// `items` holds exactly the accepted verdicts in proposer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub proposed_count: usize,
    pub validated_count: usize,
    pub rejected_count: usize,
    /// Mean confidence over ALL verdicts, accepted and rejected.
    pub average_confidence: f32,
    pub items: Vec<ReportItem>,
    /// Accepted items whose category the verifier changed.
    pub category_corrections: usize,
    /// 1 for a single pass, window count for chunked runs.
    pub chunks_processed: usize,
}

impl ConsensusReport {
    /// Zero-candidate outcome. Valid, not an error.
    pub fn empty() -> Self {
        Self {
            proposed_count: 0,
            validated_count: 0,
            rejected_count: 0,
            average_confidence: 0.0,
            items: Vec::new(),
            category_corrections: 0,
            chunks_processed: 1,
        }
    }
}

// ═══════════════════════════════════════════
// Wire response
// ═══════════════════════════════════════════

/// Field-exact response returned by `extract` / `extract_chunked`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub strategy: String,
    pub model_a: String,
    pub model_b: String,
    pub original_count: usize,
    pub validated_count: usize,
    pub rejected_count: usize,
    pub confidence_avg: f32,
    pub data: Vec<ResponseItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseItem {
    pub name: String,
    pub excerpt: String,
    pub category: Category,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_notes: Option<String>,
}

impl ExtractionResponse {
    pub fn from_report(report: &ConsensusReport, model_a: &str, model_b: &str) -> Self {
        Self {
            strategy: STRATEGY_NAME.to_string(),
            model_a: model_a.to_string(),
            model_b: model_b.to_string(),
            original_count: report.proposed_count,
            validated_count: report.validated_count,
            rejected_count: report.rejected_count,
            confidence_avg: report.average_confidence,
            data: report
                .items
                .iter()
                .map(|item| ResponseItem {
                    name: item.candidate.name.clone(),
                    excerpt: item.candidate.excerpt.clone(),
                    category: item.category,
                    confidence: item.confidence,
                    verification_notes: item.notes.clone(),
                })
                .collect(),
        }
    }
}

/// Configuration health of the two collaborators (no network calls).
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// "online" when both roles have credentials, else "degraded".
    pub status: &'static str,
    pub system: &'static str,
    pub proposer: ModelStatus,
    pub verifier: ModelStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub model: String,
    pub provider: &'static str,
    pub configured: bool,
}
