//! Structured-payload extraction from free-form model output.
//!
//! Language models asked for "raw JSON only" still wrap their answer in
//! prose or code fences often enough that the output cannot be parsed
//! directly. [`extract_object`] takes the greedy span from the first `{`
//! to the last `}` and parses it as a JSON object; [`extract_files`] turns
//! that object into a [`FileMap`], substituting a single diagnostic
//! [`ERROR_FILE`] entry when extraction fails.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::FileMap;

/// Key of the single entry returned when no file map can be extracted.
pub const ERROR_FILE: &str = "error.txt";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No valid JSON found in LLM output.")]
    NoPayload,
    #[error("JSON payload is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Greedy and dot-matches-newline: first '{' through last '}'.
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

/// Locate and parse the first brace-delimited JSON object in `raw`.
pub fn extract_object(raw: &str) -> Result<Map<String, Value>, ExtractError> {
    let found = object_pattern()
        .find(raw)
        .ok_or(ExtractError::NoPayload)?;
    let object: Map<String, Value> = serde_json::from_str(found.as_str())?;
    Ok(object)
}

/// Extract a filename → content map from model output.
///
/// String values are kept verbatim; any other JSON value is kept as its
/// JSON text. On failure the result holds exactly one [`ERROR_FILE`]
/// entry carrying the reason and the raw output.
pub fn extract_files(raw: &str) -> FileMap {
    match extract_object(raw) {
        Ok(object) => object
            .into_iter()
            .map(|(name, value)| {
                let content = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, content)
            })
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, raw_bytes = raw.len(), "could not extract files from model output");
            error_files(&err, raw)
        }
    }
}

fn error_files(err: &ExtractError, raw: &str) -> FileMap {
    let mut files = FileMap::new();
    files.insert(
        ERROR_FILE.to_string(),
        format!(
            "Failed to parse files from LLM output.\nError: {}\n\nRaw output:\n{}",
            err, raw
        ),
    );
    files
}
