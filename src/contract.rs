//! Acceptance check for a stage's output before it becomes the current context.
//!
//! The model is asked to return the whole updated context. Rather than trusting that
//! reply wholesale, each stage's JSON is checked for the sections it must carry and then
//! merged into the previous context: `thinking` only grows, `results` is only taken from
//! the final stage, and that stage must produce a complete [`SalesReport`].

use crate::error::{Result, SalesAnalysisError};
use crate::schema::{AnalysisContext, ContextHeader, SalesReport, Stage};
use log::{debug, warn};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedStage {
    pub context: AnalysisContext,
    /// Whether the returned `context` header matched the one the stage was given.
    pub header_preserved: bool,
}

fn violation(stage: Stage, details: impl Into<String>) -> SalesAnalysisError {
    SalesAnalysisError::StageContractViolation {
        stage,
        details: details.into(),
    }
}

/// Optional object-valued section; anything other than an object or absence is an error.
fn object_section(
    stage: Stage,
    root: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<Map<String, Value>>> {
    match root.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(violation(
            stage,
            format!("\"{}\" must be an object, got {}", key, json_kind(&other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validates `output` for `stage` and merges it over `previous`.
pub fn accept_stage_output(
    stage: Stage,
    previous: &AnalysisContext,
    output: Value,
) -> Result<AcceptedStage> {
    let mut root = match output {
        Value::Object(map) => map,
        other => {
            return Err(violation(
                stage,
                format!("expected a JSON object, got {}", json_kind(&other)),
            ))
        }
    };

    let header_value = root
        .remove("context")
        .ok_or_else(|| violation(stage, "missing \"context\" section"))?;
    let header: ContextHeader = serde_json::from_value(header_value)
        .map_err(|e| violation(stage, format!("invalid \"context\" section: {}", e)))?;

    let thinking = object_section(stage, &mut root, "thinking")?.unwrap_or_default();
    let results = object_section(stage, &mut root, "results")?.unwrap_or_default();

    if !root.is_empty() {
        let keys: Vec<&str> = root.keys().map(String::as_str).collect();
        debug!("{} stage returned extra top-level keys, ignored: {:?}", stage, keys);
    }

    let header_preserved = header == previous.context;
    if !header_preserved {
        // Unresolved trust boundary: flagged, carried forward as returned.
        warn!(
            "{} stage rewrote the context header: {:?} -> {:?}",
            stage, previous.context, header
        );
    }

    let mut merged_thinking = previous.thinking.clone();
    let mut added = 0usize;
    for (key, value) in thinking {
        match merged_thinking.get(&key) {
            Some(existing) if *existing != value => {
                warn!(
                    "{} stage tried to overwrite thinking.{}; keeping the earlier finding",
                    stage, key
                );
            }
            Some(_) => {}
            None => {
                merged_thinking.insert(key, value);
                added += 1;
            }
        }
    }

    let mut merged_results = previous.results.clone();
    if stage == Stage::ResultGeneration {
        for (key, value) in results {
            merged_results.insert(key, value);
        }
    } else if !results.is_empty() {
        let keys: Vec<&str> = results.keys().map(String::as_str).collect();
        warn!(
            "{} stage wrote to \"results\" before the final stage; dropped: {:?}",
            stage, keys
        );
    }

    let context = AnalysisContext {
        context: header,
        thinking: merged_thinking,
        results: merged_results,
    };

    match stage {
        Stage::DataUnderstanding | Stage::AnalyticalReasoning => {
            if added == 0 {
                return Err(violation(stage, "no new findings were added to \"thinking\""));
            }
        }
        Stage::ResultGeneration => {
            validate_report(&context.results)
                .map_err(|e| violation(stage, format!("incomplete \"results\": {}", e)))?;
        }
    }

    debug!(
        "{} stage accepted: {} thinking keys (+{}), {} result keys",
        stage,
        context.thinking.len(),
        added,
        context.results.len()
    );

    Ok(AcceptedStage {
        context,
        header_preserved,
    })
}

fn validate_report(results: &Map<String, Value>) -> std::result::Result<SalesReport, String> {
    let report: SalesReport =
        serde_json::from_value(Value::Object(results.clone())).map_err(|e| e.to_string())?;

    if report.summary.trim().is_empty() {
        return Err("summary is empty".to_string());
    }
    if report.insights.is_empty() {
        return Err("no insights".to_string());
    }
    if report.recommendations.is_empty() {
        return Err("no recommendations".to_string());
    }
    if let Some(idx) = report.recommendations.iter().position(|r| r.steps.is_empty()) {
        return Err(format!("recommendation #{} has no steps", idx + 1));
    }

    Ok(report)
}
