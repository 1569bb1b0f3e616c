//! Model response parsing.
//!
//! Model output is never trusted to have a shape. Every response is parsed
//! into a tagged result: the parsed value, or the raw text plus a reason.

use serde_json::{Map, Value};

use super::sanitize::sanitize_llm_output;
use super::types::Category;

// ═══════════════════════════════════════════
// Shared helpers
// ═══════════════════════════════════════════

/// Extract a JSON block from LLM response text.
/// Handles code fences and prose before/after the JSON.
pub fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return Some(block);
            }
        }
    }

    // Whichever bracket opens first decides array vs object.
    let open = trimmed.find(['[', '{'])?;
    if trimmed[open..].starts_with('[') {
        bracketed(trimmed, '[', ']')
    } else {
        bracketed(trimmed, '{', '}')
    }
}

/// Span from the first `open` to the last `close`.
fn bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then(|| &text[start..=end])
}

fn parse_json(response: &str) -> Result<Value, String> {
    let cleaned = sanitize_llm_output(response);
    let block = extract_json_block(&cleaned).ok_or_else(|| "no JSON block found".to_string())?;
    let err = match serde_json::from_str::<Value>(block) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    // Prose like "Verdict [final]: {...}" opens with the wrong bracket kind.
    let (open, close) = if block.starts_with('[') { ('{', '}') } else { ('[', ']') };
    bracketed(cleaned.trim(), open, close)
        .and_then(|other| serde_json::from_str::<Value>(other).ok())
        .ok_or_else(|| format!("invalid JSON: {err}"))
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn bool_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "valid" | "accepted" => Some(true),
            "false" | "no" | "invalid" | "rejected" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Confidence in [0, 1]. Values in (1, 100] are read as percentages.
fn confidence_field(obj: &Map<String, Value>) -> Option<f32> {
    let raw = ["confidence", "confidence_score", "score"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
            _ => None,
        })?;

    let value = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
    (0.0..=1.0).contains(&value).then_some(value as f32)
}

// ═══════════════════════════════════════════
// Proposals
// ═══════════════════════════════════════════

/// A candidate as the proposer wrote it, before grounding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub name: String,
    pub excerpt: String,
    pub category: Category,
}

/// Outcome of parsing a proposer response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedProposal {
    Parsed(Vec<RawCandidate>),
    Failed { raw: String, reason: String },
}

/// Parse the proposer's structured list. Accepts a bare array, an object
/// wrapping an array (`parameters`, `candidates`, `results`), or a single
/// candidate object. Entries missing a name or excerpt are skipped; a
/// non-empty list with no usable entry is a failure.
pub fn parse_proposal(response: &str) -> ParsedProposal {
    let failed = |reason: String| ParsedProposal::Failed {
        raw: response.to_string(),
        reason,
    };

    let value = match parse_json(response) {
        Ok(v) => v,
        Err(reason) => return failed(reason),
    };

    let entries: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            let wrapped = ["parameters", "candidates", "results"]
                .iter()
                .find_map(|k| match obj.remove(*k) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                });
            match wrapped {
                Some(items) => items,
                None if obj.contains_key("name") => vec![Value::Object(obj)],
                None => return failed("object has no candidate list".into()),
            }
        }
        _ => return failed("top-level JSON is neither a list nor an object".into()),
    };

    let total = entries.len();
    let candidates: Vec<RawCandidate> = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let name = string_field(obj, &["name", "parameter"])?;
            let excerpt = string_field(obj, &["excerpt", "quote", "source_excerpt"])?;
            let category = string_field(obj, &["category"])
                .map(|c| Category::parse_lenient(&c))
                .unwrap_or(Category::Other);
            Some(RawCandidate { name, excerpt, category })
        })
        .collect();

    if total > 0 && candidates.is_empty() {
        return failed(format!("none of the {total} entries has a name and excerpt"));
    }
    if candidates.len() < total {
        tracing::debug!(
            skipped = total - candidates.len(),
            "Skipped malformed proposer entries"
        );
    }

    ParsedProposal::Parsed(candidates)
}

// ═══════════════════════════════════════════
// Verdicts
// ═══════════════════════════════════════════

/// The verifier's structured answer for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVerdict {
    pub accepted: bool,
    pub confidence: f32,
    pub notes: Option<String>,
    pub category: Option<Category>,
}

/// Outcome of parsing a single-candidate verifier response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedVerdict {
    Parsed(RawVerdict),
    Failed { raw: String, reason: String },
}

fn verdict_from_object(obj: &Map<String, Value>) -> Result<RawVerdict, String> {
    let accepted = bool_field(obj, &["accepted", "is_valid", "valid"])
        .ok_or_else(|| "missing accepted flag".to_string())?;
    let confidence =
        confidence_field(obj).ok_or_else(|| "missing or out-of-range confidence".to_string())?;

    let mut notes_parts = Vec::new();
    if let Some(n) = string_field(obj, &["notes", "verification_notes"]) {
        notes_parts.push(n);
    }
    if !accepted {
        if let Some(r) = string_field(obj, &["rejection_reason"]) {
            notes_parts.push(r);
        }
    }
    let notes = (!notes_parts.is_empty()).then(|| notes_parts.join(" "));

    let category = string_field(obj, &["corrected_category", "category"])
        .map(|c| Category::parse_lenient(&c));

    Ok(RawVerdict {
        accepted,
        confidence,
        notes,
        category,
    })
}

/// Parse a verifier response for one candidate. A `{"results":[…]}`
/// wrapper is tolerated and its first entry used.
pub fn parse_verdict(response: &str) -> ParsedVerdict {
    let failed = |reason: String| ParsedVerdict::Failed {
        raw: response.to_string(),
        reason,
    };

    let value = match parse_json(response) {
        Ok(v) => v,
        Err(reason) => return failed(reason),
    };

    let obj = match &value {
        Value::Object(obj) => match obj.get("results").and_then(Value::as_array) {
            Some(results) => results.first().and_then(Value::as_object),
            None => Some(obj),
        },
        Value::Array(items) => items.first().and_then(Value::as_object),
        _ => None,
    };

    match obj.map(verdict_from_object) {
        Some(Ok(verdict)) => ParsedVerdict::Parsed(verdict),
        Some(Err(reason)) => failed(reason),
        None => failed("no verdict object found".into()),
    }
}

/// One entry of a batch verifier response, with whatever keys it carried
/// for matching it back to a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchVerdictEntry {
    pub index: Option<usize>,
    pub name: Option<String>,
    pub excerpt: Option<String>,
    pub verdict: Result<RawVerdict, String>,
}

/// Parse a batch verifier response (`{"results":[…]}` or a bare array).
/// Returns `Err(reason)` when no result list can be found at all.
pub fn parse_batch_verdicts(response: &str) -> Result<Vec<BatchVerdictEntry>, String> {
    let value = parse_json(response)?;
    let results = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("results") {
            Some(Value::Array(items)) => items,
            _ => return Err("object has no results list".into()),
        },
        _ => return Err("top-level JSON is neither a list nor an object".into()),
    };

    Ok(results
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| BatchVerdictEntry {
            index: obj
                .get("id")
                .or_else(|| obj.get("index"))
                .and_then(Value::as_u64)
                .map(|i| i as usize),
            name: string_field(obj, &["name"]),
            excerpt: string_field(obj, &["excerpt"]),
            verdict: verdict_from_object(obj),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(p: ParsedProposal) -> Vec<RawCandidate> {
        match p {
            ParsedProposal::Parsed(c) => c,
            ParsedProposal::Failed { reason, .. } => panic!("expected parse, got failure: {reason}"),
        }
    }

    #[test]
    fn json_block_from_fence() {
        let r = "Here you go:\n```json\n[{\"a\":1}]\n```\nDone.";
        assert_eq!(extract_json_block(r), Some("[{\"a\":1}]"));
    }

    #[test]
    fn json_block_from_bare_fence() {
        let r = "```\n{\"a\":1}\n```";
        assert_eq!(extract_json_block(r), Some("{\"a\":1}"));
    }

    #[test]
    fn json_block_array_with_prose() {
        let r = "Sure! [{\"a\": {\"b\": 2}}] hope this helps";
        assert_eq!(extract_json_block(r), Some("[{\"a\": {\"b\": 2}}]"));
    }

    #[test]
    fn json_block_none_without_brackets() {
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn proposal_bare_array() {
        let r = r#"[{"name":"misa","excerpt":"The misa CSR","category":"Named","reasoning":"x"}]"#;
        let c = parsed(parse_proposal(r));
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].name, "misa");
        assert_eq!(c[0].category, Category::Named);
    }

    #[test]
    fn proposal_wrapped_in_parameters() {
        let r = r#"{"parameters":[{"name":"XLEN","excerpt":"XLEN is 32","category":"Numeric"}]}"#;
        assert_eq!(parsed(parse_proposal(r))[0].name, "XLEN");
    }

    #[test]
    fn proposal_single_object() {
        let r = r#"{"name":"MXL","excerpt":"The MXL field","category":"ConfigDependent"}"#;
        let c = parsed(parse_proposal(r));
        assert_eq!(c[0].category, Category::ConfigDependent);
    }

    #[test]
    fn proposal_empty_array_is_ok() {
        assert!(parsed(parse_proposal("[]")).is_empty());
    }

    #[test]
    fn proposal_skips_malformed_entries() {
        let r = r#"[{"name":"a"},{"name":"b","excerpt":"b text"},42]"#;
        let c = parsed(parse_proposal(r));
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].name, "b");
    }

    #[test]
    fn proposal_missing_category_defaults_to_other() {
        let c = parsed(parse_proposal(r#"[{"name":"a","excerpt":"a text"}]"#));
        assert_eq!(c[0].category, Category::Other);
    }

    #[test]
    fn proposal_all_entries_malformed_fails() {
        assert!(matches!(
            parse_proposal(r#"[{"foo":1},{"bar":2}]"#),
            ParsedProposal::Failed { .. }
        ));
    }

    #[test]
    fn proposal_prose_fails_with_raw_kept() {
        match parse_proposal("I could not find any parameters, sorry.") {
            ParsedProposal::Failed { raw, .. } => assert!(raw.contains("sorry")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn proposal_truncated_json_fails() {
        assert!(matches!(
            parse_proposal(r#"[{"name":"misa","excerpt":"The mi"#),
            ParsedProposal::Failed { .. }
        ));
    }

    #[test]
    fn proposal_after_think_block() {
        let r = "<think>[not json]</think>[{\"name\":\"a\",\"excerpt\":\"b\"}]";
        assert_eq!(parsed(parse_proposal(r)).len(), 1);
    }

    #[test]
    fn verdict_basic() {
        let r = r#"{"accepted": true, "confidence": 0.95, "notes": "verbatim"}"#;
        assert_eq!(
            parse_verdict(r),
            ParsedVerdict::Parsed(RawVerdict {
                accepted: true,
                confidence: 0.95,
                notes: Some("verbatim".into()),
                category: None,
            })
        );
    }

    #[test]
    fn verdict_after_bracketed_prose() {
        let r = r#"Verdict [final]: {"accepted": true, "confidence": 0.9}"#;
        assert_eq!(
            parse_verdict(r),
            ParsedVerdict::Parsed(RawVerdict {
                accepted: true,
                confidence: 0.9,
                notes: None,
                category: None,
            })
        );
    }

    #[test]
    fn proposal_after_braced_prose() {
        let r = r#"Found {2} parameters: [{"name":"misa","excerpt":"The misa CSR","category":"Named"}]"#;
        let c = parsed(parse_proposal(r));
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].name, "misa");
    }

    #[test]
    fn verdict_original_field_names() {
        let r = r#"{"results":[{"is_valid": false, "confidence": 0.2, "rejection_reason": "paraphrased", "verification_notes": "not in text", "category": "Numeric"}]}"#;
        match parse_verdict(r) {
            ParsedVerdict::Parsed(v) => {
                assert!(!v.accepted);
                assert_eq!(v.notes.as_deref(), Some("not in text paraphrased"));
                assert_eq!(v.category, Some(Category::Numeric));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn verdict_percentage_confidence() {
        match parse_verdict(r#"{"accepted":true,"confidence":"85%"}"#) {
            ParsedVerdict::Parsed(v) => assert!((v.confidence - 0.85).abs() < 1e-6),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn verdict_out_of_range_confidence_fails() {
        assert!(matches!(
            parse_verdict(r#"{"accepted":true,"confidence":-0.3}"#),
            ParsedVerdict::Failed { .. }
        ));
        assert!(matches!(
            parse_verdict(r#"{"accepted":true,"confidence":250}"#),
            ParsedVerdict::Failed { .. }
        ));
    }

    #[test]
    fn verdict_missing_flag_fails() {
        assert!(matches!(
            parse_verdict(r#"{"confidence":0.9}"#),
            ParsedVerdict::Failed { .. }
        ));
    }

    #[test]
    fn verdict_garbage_fails() {
        assert!(matches!(parse_verdict("yes it is valid"), ParsedVerdict::Failed { .. }));
    }

    #[test]
    fn verdict_string_flag() {
        match parse_verdict(r#"{"accepted":"yes","confidence":0.7}"#) {
            ParsedVerdict::Parsed(v) => assert!(v.accepted),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn batch_results_with_ids() {
        let r = r#"{"results":[
            {"id":1,"name":"b","excerpt":"bb","accepted":true,"confidence":0.9},
            {"id":0,"name":"a","excerpt":"aa","accepted":false,"confidence":0.1},
            {"id":2,"accepted":true}
        ],"summary":{"validated":1}}"#;
        let entries = parse_batch_verdicts(r).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].index, Some(1));
        assert!(entries[0].verdict.as_ref().unwrap().accepted);
        assert_eq!(entries[1].name.as_deref(), Some("a"));
        assert!(entries[2].verdict.is_err());
    }

    #[test]
    fn batch_without_results_fails() {
        assert!(parse_batch_verdicts(r#"{"summary":{}}"#).is_err());
        assert!(parse_batch_verdicts("nothing").is_err());
    }
}
