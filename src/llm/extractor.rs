//! Recovers a JSON value from free-form model output.
//!
//! This is a heuristic, not a parser. It tries, in order: a ```` ```json ```` fenced
//! block, a reply that already is a bare object, then everything between the first
//! `{` and the last `}`. Prose containing stray braces can defeat the last step.
//! Requesting JSON mode from the model (see `GenerationSettings::json_mode`) is the
//! preferred way to get clean output; this stays as the fallback.

use crate::error::{Result, SalesAnalysisError};
use crate::utils::truncate_chars;
use log::{debug, error, warn};
use serde_json::Value;

/// Characters of offending text kept for diagnostics.
pub const SNIPPET_CHARS: usize = 500;

const FENCE: &str = "```";
const JSON_TAG: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Fenced,
    Raw,
    BraceScan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub strategy: ExtractionStrategy,
}

/// Parses the JSON carried by a model response.
pub fn extract_json(text: &str) -> Result<Value> {
    extract_json_detailed(text).map(|extracted| extracted.value)
}

pub fn extract_json_detailed(text: &str) -> Result<Extracted> {
    let Some((candidate, strategy)) = locate_candidate(text) else {
        warn!(
            "No JSON boundary in model response: {}",
            truncate_chars(text.trim(), SNIPPET_CHARS)
        );
        return Err(SalesAnalysisError::ExtractionFailure);
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => {
            debug!("Extracted JSON via {:?}", strategy);
            Ok(Extracted { value, strategy })
        }
        Err(e) => {
            let snippet = truncate_chars(candidate, SNIPPET_CHARS).to_string();
            error!("JSON parse error: {} (text: {})", e, snippet);
            Err(SalesAnalysisError::MalformedJson {
                message: e.to_string(),
                snippet,
            })
        }
    }
}

fn locate_candidate(text: &str) -> Option<(&str, ExtractionStrategy)> {
    let trimmed = text.trim();

    if let Some(body) = strip_json_fence(trimmed) {
        return Some((body, ExtractionStrategy::Fenced));
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some((trimmed, ExtractionStrategy::Raw));
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some((&trimmed[start..=end], ExtractionStrategy::BraceScan))
}

/// Body of a fence opened with a `json` tag.
///
/// The block closes at the first line holding nothing but a fence; JSON strings cannot
/// span lines, so backticks inside values never end it early. Without such a line the
/// last fence in the text closes it, and an unterminated fence yields everything after
/// the opening line.
fn strip_json_fence(text: &str) -> Option<&str> {
    let after_fence = text.strip_prefix(FENCE)?;
    let tag = after_fence.get(..JSON_TAG.len())?;
    if !tag.eq_ignore_ascii_case(JSON_TAG) {
        return None;
    }
    let body = &after_fence[JSON_TAG.len()..];

    let close = closing_fence_line(body).or_else(|| body.rfind(FENCE));
    let body = match close {
        Some(close) => &body[..close],
        None => body,
    };
    Some(body.trim())
}

/// Byte offset of the first line (after the opening one) that is only a fence.
fn closing_fence_line(body: &str) -> Option<usize> {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if offset > 0 && line.trim() == FENCE {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_block() {
        let extracted = extract_json_detailed("```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(extracted.value, json!({ "a": 1 }));
        assert_eq!(extracted.strategy, ExtractionStrategy::Fenced);
    }

    #[test]
    fn test_fenced_block_with_trailing_prose() {
        let text = "```JSON\n{\"a\": {\"b\": [1, 2]}}\n```\n希望這有幫助！";
        assert_eq!(extract_json(text).unwrap(), json!({ "a": { "b": [1, 2] } }));
    }

    #[test]
    fn test_backticks_inside_fenced_strings() {
        let text = "```json\n{\"a\": \"use ```code``` here\"}\n```";
        let extracted = extract_json_detailed(text).unwrap();
        assert_eq!(extracted.value, json!({ "a": "use ```code``` here" }));
        assert_eq!(extracted.strategy, ExtractionStrategy::Fenced);
    }

    #[test]
    fn test_fence_closed_on_same_line() {
        let text = "```json\n{\"a\": 1}```\n說明文字";
        assert_eq!(extract_json(text).unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn test_raw_json() {
        let extracted = extract_json_detailed("  {\"a\":1}\n").unwrap();
        assert_eq!(extracted.value, json!({ "a": 1 }));
        assert_eq!(extracted.strategy, ExtractionStrategy::Raw);
    }

    #[test]
    fn test_embedded_in_prose() {
        let extracted = extract_json_detailed("Here is the result: {\"a\":1} — done.").unwrap();
        assert_eq!(extracted.value, json!({ "a": 1 }));
        assert_eq!(extracted.strategy, ExtractionStrategy::BraceScan);
    }

    #[test]
    fn test_untagged_fence_falls_back_to_brace_scan() {
        let text = "```\n{\"a\":1}\n```";
        let extracted = extract_json_detailed(text).unwrap();
        assert_eq!(extracted.strategy, ExtractionStrategy::BraceScan);
    }

    #[test]
    fn test_no_json() {
        assert!(matches!(
            extract_json("no json here"),
            Err(SalesAnalysisError::ExtractionFailure)
        ));
        assert!(matches!(
            extract_json("} backwards {"),
            Err(SalesAnalysisError::ExtractionFailure)
        ));
    }

    #[test]
    fn test_malformed_json_keeps_snippet() {
        let text = format!("Result: {{\"a\": }} {}", "x".repeat(1000));
        match extract_json(&text) {
            Err(SalesAnalysisError::MalformedJson { snippet, .. }) => {
                assert!(snippet.starts_with("{\"a\": }"));
                assert!(snippet.chars().count() <= SNIPPET_CHARS);
            }
            other => panic!("expected MalformedJson, got {:?}", other),
        }
    }

    #[test]
    fn test_unbalanced_prose_braces_defeat_scan() {
        let text = "Use {curly} braces: {\"a\":1}";
        assert!(matches!(
            extract_json(text),
            Err(SalesAnalysisError::MalformedJson { .. })
        ));
    }
}
