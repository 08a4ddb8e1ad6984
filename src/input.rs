//! Query record input.
//!
//! Accepts the shapes the upstream workflow produces:
//!
//! - a JSON array of chunk objects,
//! - a single chunk object,
//! - JSON Lines, one chunk object per line.
//!
//! Field names follow the workflow (`book_title`, `chunk_number`,
//! `chunk_text`, `embedding`); `document_title`, `chunk_index`, and
//! `vector` are accepted as aliases. Only the vector is required:
//! the title defaults to `"Unknown"` and the chunk index to the record's
//! 1-based position in the input.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

use crate::config::MalformedPolicy;
use subgenre_match_core::models::QueryRecord;
use subgenre_match_core::MatchError;

pub const UNKNOWN_TITLE: &str = "Unknown";

/// Records that passed validation, plus how many were dropped.
#[derive(Debug, Default)]
pub struct ParsedInput {
    pub records: Vec<QueryRecord>,
    pub skipped: usize,
}

/// Read the whole input from `path`, or stdin when `path` is `None` or `-`.
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read input file: {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Split raw input into JSON values, one per record.
///
/// Unparseable JSON Lines entries come back as `Err` with their reason so
/// the malformed-record policy can decide what to do with them. Input that
/// is neither one JSON document nor JSON Lines is rejected as a whole.
fn split_values(text: &str) -> Result<Vec<Result<Value, String>>, MatchError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let whole_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => return Ok(items.into_iter().map(Ok).collect()),
        Ok(other) => return Ok(vec![Ok(other)]),
        Err(e) => e,
    };
    let invalid = || MatchError::InvalidInput(format!("input is not valid JSON: {}", whole_err));

    if trimmed.starts_with('[') {
        return Err(invalid());
    }

    let lines: Vec<Result<Value, String>> = trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str::<Value>(l).map_err(|e| format!("invalid JSON: {}", e)))
        .collect();

    // JSON Lines has at least one line holding a complete object; otherwise
    // this is one document with a syntax error.
    if !lines.iter().any(|l| matches!(l, Ok(Value::Object(_)))) {
        return Err(invalid());
    }

    Ok(lines)
}

fn first_field<'a>(obj: &'a serde_json::Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|n| obj.get(*n))
        .find(|v| !v.is_null())
}

/// Validate one JSON value as a query record. `position` is 1-based.
pub fn record_from_value(value: &Value, position: usize) -> Result<QueryRecord, MatchError> {
    let malformed = |reason: String| MatchError::MalformedQueryRecord { position, reason };

    let obj = value
        .as_object()
        .ok_or_else(|| malformed("record is not a JSON object".to_string()))?;

    let vector = match first_field(obj, &["embedding", "vector"]) {
        None => return Err(malformed("missing embedding".to_string())),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_f64())
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| malformed("embedding contains a non-numeric value".to_string()))?,
        Some(_) => return Err(malformed("embedding is not an array".to_string())),
    };
    if vector.is_empty() {
        return Err(malformed("embedding is empty".to_string()));
    }

    let document_title = match first_field(obj, &["book_title", "document_title"]) {
        None => UNKNOWN_TITLE.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(malformed("book_title is not a string".to_string())),
    };

    let chunk_index = match first_field(obj, &["chunk_number", "chunk_index"]) {
        None => position as i64,
        Some(v) => v
            .as_i64()
            .or_else(|| {
                v.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| malformed("chunk_number is not an integer".to_string()))?,
    };

    let chunk_text = match obj.get("chunk_text") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(malformed("chunk_text is not a string".to_string())),
    };

    Ok(QueryRecord {
        document_title,
        chunk_index,
        chunk_text,
        vector,
    })
}

/// Parse every record in `text`, applying the malformed-record policy.
pub fn parse_query_records(text: &str, policy: MalformedPolicy) -> Result<ParsedInput, MatchError> {
    let mut parsed = ParsedInput::default();

    for (i, item) in split_values(text)?.into_iter().enumerate() {
        let position = i + 1;
        let result = item
            .map_err(|reason| MatchError::MalformedQueryRecord { position, reason })
            .and_then(|v| record_from_value(&v, position));

        match (result, policy) {
            (Ok(record), _) => parsed.records.push(record),
            (Err(e), MalformedPolicy::Abort) => return Err(e),
            (Err(e), MalformedPolicy::Skip) => {
                tracing::warn!("skipping record: {}", e);
                parsed.skipped += 1;
            }
        }
    }

    Ok(parsed)
}
