//! Consensus merging: verdicts in, report out. Pure and deterministic.

use std::collections::HashMap;

use super::error::ConsensusError;
use super::types::{CandidateParameter, ConsensusReport, ReportItem, VerificationVerdict};

/// Merge the proposer's candidates with the verifier's verdicts for one
/// pass. Both lists must line up one to one, in the same order.
pub fn merge(
    candidates: &[CandidateParameter],
    verdicts: &[VerificationVerdict],
) -> Result<ConsensusReport, ConsensusError> {
    check_alignment(candidates, verdicts)?;
    Ok(build_report(verdicts, 1))
}

/// Each verdict must answer the candidate at the same position.
pub fn check_alignment(
    candidates: &[CandidateParameter],
    verdicts: &[VerificationVerdict],
) -> Result<(), ConsensusError> {
    if candidates.len() != verdicts.len() {
        return Err(ConsensusError::VerdictMismatch(format!(
            "{} candidates but {} verdicts",
            candidates.len(),
            verdicts.len()
        )));
    }
    if let Some(pos) = candidates
        .iter()
        .zip(verdicts)
        .position(|(c, v)| c.identity() != v.candidate.identity())
    {
        return Err(ConsensusError::VerdictMismatch(format!(
            "verdict {pos} is for '{}', expected '{}'",
            verdicts[pos].candidate.name, candidates[pos].name
        )));
    }
    Ok(())
}

/// Derive counts, average and items from a verdict list.
pub fn build_report(verdicts: &[VerificationVerdict], chunks_processed: usize) -> ConsensusReport {
    let proposed_count = verdicts.len();
    let validated_count = verdicts.iter().filter(|v| v.accepted).count();

    let average_confidence = if verdicts.is_empty() {
        0.0
    } else {
        let sum: f64 = verdicts.iter().map(|v| f64::from(v.confidence)).sum();
        (sum / proposed_count as f64) as f32
    };

    let items: Vec<ReportItem> = verdicts
        .iter()
        .filter(|v| v.accepted)
        .map(|v| ReportItem {
            candidate: v.candidate.clone(),
            category: v.effective_category(),
            confidence: v.confidence,
            notes: v.notes.clone(),
        })
        .collect();

    let category_corrections = verdicts
        .iter()
        .filter(|v| v.accepted && v.corrected_category.is_some())
        .count();

    ConsensusReport {
        proposed_count,
        validated_count,
        rejected_count: proposed_count - validated_count,
        average_confidence,
        items,
        category_corrections,
        chunks_processed,
    }
}

/// Merge per-window verdict lists, given in ascending chunk index.
///
/// - Same `(name, excerpt)` seen again (the overlap case): the later
///   window's verdict replaces the earlier one in place.
/// - Same case-insensitive name with a different excerpt: the strictly
///   higher-confidence verdict is kept, in the earlier slot.
///
/// Output order is first appearance across windows.
pub fn merge_windows(windows: Vec<Vec<VerificationVerdict>>) -> Vec<VerificationVerdict> {
    let mut merged: Vec<VerificationVerdict> = Vec::new();
    let mut by_identity: HashMap<(String, String), usize> = HashMap::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for (chunk_index, verdicts) in windows.into_iter().enumerate() {
        for verdict in verdicts {
            let identity = (
                verdict.candidate.name.clone(),
                verdict.candidate.excerpt.clone(),
            );
            let name_key = verdict.candidate.name.to_lowercase();

            if let Some(&slot) = by_identity.get(&identity) {
                merged[slot] = verdict;
                continue;
            }

            if let Some(&slot) = by_name.get(&name_key) {
                if verdict.confidence > merged[slot].confidence {
                    let old = &merged[slot].candidate;
                    by_identity.remove(&(old.name.clone(), old.excerpt.clone()));
                    by_identity.insert(identity, slot);
                    merged[slot] = verdict;
                } else {
                    tracing::debug!(
                        chunk_index,
                        candidate = %verdict.candidate.name,
                        "Dropped lower-confidence duplicate from overlapping window"
                    );
                }
                continue;
            }

            let slot = merged.len();
            by_identity.insert(identity, slot);
            by_name.insert(name_key, slot);
            merged.push(verdict);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Category;

    fn verdict(name: &str, excerpt: &str, accepted: bool, confidence: f32) -> VerificationVerdict {
        VerificationVerdict {
            candidate: CandidateParameter::new(name, excerpt, Category::Named),
            accepted,
            confidence,
            notes: None,
            corrected_category: None,
        }
    }

    #[test]
    fn single_accepted_candidate() {
        let v = verdict("misa", "The misa CSR is a WARL read-write register", true, 0.95);
        let report = merge(&[v.candidate.clone()], &[v]).unwrap();
        assert_eq!(report.proposed_count, 1);
        assert_eq!(report.validated_count, 1);
        assert_eq!(report.rejected_count, 0);
        assert!((report.average_confidence - 0.95).abs() < 1e-6);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.chunks_processed, 1);
    }

    #[test]
    fn average_includes_rejected() {
        let vs = vec![
            verdict("a", "a", true, 0.9),
            verdict("b", "b", false, 0.1),
            verdict("c", "c", true, 0.8),
        ];
        let cs: Vec<_> = vs.iter().map(|v| v.candidate.clone()).collect();
        let report = merge(&cs, &vs).unwrap();
        assert_eq!(report.validated_count, 2);
        assert_eq!(report.rejected_count, 1);
        assert!((report.average_confidence - 0.6).abs() < 1e-6);
        let names: Vec<&str> = report.items.iter().map(|i| i.candidate.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn zero_candidates_is_a_zero_report() {
        let report = merge(&[], &[]).unwrap();
        assert_eq!(report, ConsensusReport::empty());
    }

    #[test]
    fn length_mismatch_is_error() {
        let v = verdict("a", "a", true, 0.9);
        let err = merge(&[], &[v]).unwrap_err();
        assert!(matches!(err, ConsensusError::VerdictMismatch(_)));
    }

    #[test]
    fn order_mismatch_is_error() {
        let a = verdict("a", "a", true, 0.9);
        let b = verdict("b", "b", true, 0.9);
        let err = merge(
            &[a.candidate.clone(), b.candidate.clone()],
            &[b, a],
        )
        .unwrap_err();
        assert!(matches!(err, ConsensusError::VerdictMismatch(_)));
    }

    #[test]
    fn alignment_check_matches_merge() {
        let a = verdict("a", "a", true, 0.9);
        let b = verdict("b", "b", false, 0.2);
        let cs = vec![a.candidate.clone(), b.candidate.clone()];
        assert!(check_alignment(&cs, &[a.clone(), b.clone()]).is_ok());
        assert!(matches!(
            check_alignment(&cs, &[b, a]),
            Err(ConsensusError::VerdictMismatch(_))
        ));
        assert!(check_alignment(&cs[..1], &[]).is_err());
    }

    #[test]
    fn corrected_category_reported() {
        let mut v = verdict("MXL", "The MXL field", true, 0.9);
        v.corrected_category = Some(Category::ConfigDependent);
        let mut rejected = verdict("x", "x", false, 0.2);
        rejected.corrected_category = Some(Category::Numeric);
        let report = build_report(&[v, rejected], 1);
        assert_eq!(report.items[0].category, Category::ConfigDependent);
        assert_eq!(report.items[0].candidate.category, Category::Named);
        assert_eq!(report.category_corrections, 1);
    }

    #[test]
    fn windows_identical_identity_last_wins() {
        let merged = merge_windows(vec![
            vec![verdict("a", "a text", true, 0.9), verdict("misa", "The misa CSR", true, 0.9)],
            vec![verdict("misa", "The misa CSR", false, 0.4), verdict("b", "b text", true, 0.7)],
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].candidate.name, "misa");
        assert!(!merged[1].accepted);
        assert_eq!(merged[2].candidate.name, "b");
    }

    #[test]
    fn windows_same_name_keeps_higher_confidence() {
        let merged = merge_windows(vec![
            vec![verdict("XLEN", "XLEN is 32", true, 0.6)],
            vec![verdict("xlen", "XLEN is 32 or 64", true, 0.9)],
            vec![verdict("Xlen", "XLEN", true, 0.5)],
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].candidate.excerpt, "XLEN is 32 or 64");
    }

    #[test]
    fn windows_equal_confidence_keeps_earlier() {
        let merged = merge_windows(vec![
            vec![verdict("XLEN", "XLEN is 32", true, 0.8)],
            vec![verdict("XLEN", "XLEN is 32 or 64", true, 0.8)],
        ]);
        assert_eq!(merged[0].candidate.excerpt, "XLEN is 32");
    }

    #[test]
    fn replaced_identity_can_reappear_by_name_only() {
        let merged = merge_windows(vec![
            vec![verdict("XLEN", "XLEN is 32", true, 0.6)],
            vec![verdict("XLEN", "XLEN is 64", true, 0.9)],
            vec![verdict("XLEN", "XLEN is 32", true, 0.7)],
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].candidate.excerpt, "XLEN is 64");
    }

    #[test]
    fn merged_counts_hold_invariant() {
        let merged = merge_windows(vec![
            vec![verdict("a", "a", true, 0.9), verdict("b", "b", false, 0.2)],
            vec![verdict("b", "b", true, 0.8), verdict("c", "c", false, 0.3)],
        ]);
        let report = build_report(&merged, 2);
        assert_eq!(report.proposed_count, 3);
        assert_eq!(report.validated_count + report.rejected_count, report.proposed_count);
        assert_eq!(report.validated_count, 2);
        assert_eq!(report.chunks_processed, 2);
    }
}
