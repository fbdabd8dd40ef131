//! Parsing of model replies into typed records.
//!
//! ## Why is this necessary?
//!
//! Even when told "return ONLY the JSON array", hosted models regularly:
//!
//! - wrap the payload in ` ```json ... ``` ` fences
//! - prepend a sentence ("Here are the claims:") or append an explanation
//! - emit a BOM or zero-width characters
//! - invent enum values or drop optional fields
//!
//! [`strip_json_fences`] recovers the JSON text; the `parse_*` functions
//! then deserialize item by item so one malformed entry does not discard
//! the rest of the reply.

use crate::output::{Claim, Contradiction, Verification, VerificationSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Why a reply could not be turned into records.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected JSON shape: expected {0}")]
    UnexpectedShape(&'static str),
}

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").unwrap());

/// Recover the JSON payload from a raw model reply.
pub fn strip_json_fences(raw: &str) -> String {
    let cleaned = remove_invisible_chars(raw);
    let s = cleaned.trim();

    if s.is_empty() || s.starts_with('[') || s.starts_with('{') {
        return s.to_string();
    }

    let s = match RE_FENCED.captures(s) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or("").trim(),
        None => s,
    };

    if s.starts_with('[') || s.starts_with('{') {
        return s.to_string();
    }

    json_span(s).unwrap_or(s).to_string()
}

/// The span from the first opening bracket to the last matching closer.
fn json_span(s: &str) -> Option<&str> {
    let start = s.find(['[', '{'])?;
    let closer = if s[start..].starts_with('[') { ']' } else { '}' };
    let end = s.rfind(closer)?;
    (end > start).then(|| &s[start..=end])
}

/// Zero-width spaces, BOM, soft hyphens and word joiners.
fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{00AD}' | '\u{2060}'))
        .collect()
}

fn parse_value(raw: &str) -> Result<Value, ParseError> {
    let payload = strip_json_fences(raw);
    if payload.is_empty() {
        return Err(ParseError::EmptyResponse);
    }
    // Only the first complete value counts; commentary after it is ignored.
    match serde_json::Deserializer::from_str(&payload).into_iter::<Value>().next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(ParseError::InvalidJson(e.to_string())),
        None => Err(ParseError::EmptyResponse),
    }
}

/// Deserialize each item independently, keeping the ones that pass `valid`.
fn collect_valid<T: DeserializeOwned>(items: Vec<Value>, valid: impl Fn(&T) -> bool, kind: &str) -> Vec<T> {
    let total = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(v) if valid(&v) => Some(v),
            Ok(_) => None,
            Err(e) => {
                warn!("Dropping malformed {}: {}", kind, e);
                None
            }
        })
        .collect();
    if kept.len() < total {
        warn!("Kept {}/{} {} item(s)", kept.len(), total, kind);
    }
    kept
}

/// Parse a phase-1 reply. Anything other than an array yields no claims.
pub fn parse_claims(raw: &str) -> Result<Vec<Claim>, ParseError> {
    match parse_value(raw)? {
        Value::Array(items) => Ok(collect_valid(items, Claim::is_valid, "claim")),
        _ => Ok(Vec::new()),
    }
}

/// Parse a phase-2 reply: `{"verifications": [...]}` or a bare array.
pub fn parse_verifications(raw: &str) -> Result<VerificationSet, ParseError> {
    let items = match parse_value(raw)? {
        Value::Object(mut map) => match map.remove("verifications") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(ParseError::UnexpectedShape("a verifications array")),
        },
        Value::Array(items) => items,
        _ => return Err(ParseError::UnexpectedShape("an object with verifications")),
    };
    Ok(VerificationSet {
        verifications: collect_valid::<Verification>(items, |v| !v.claim.trim().is_empty(), "verification"),
    })
}

/// Parse a phase-3 reply: an array, `{"contradictions": [...]}`, or a single
/// contradiction object.
pub fn parse_contradictions(raw: &str) -> Result<Vec<Contradiction>, ParseError> {
    let items = match parse_value(raw)? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("contradictions") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ParseError::UnexpectedShape("a contradictions array")),
            None if map.contains_key("claim") => vec![Value::Object(map)],
            None => Vec::new(),
        },
        Value::Null => Vec::new(),
        _ => return Err(ParseError::UnexpectedShape("an array of contradictions")),
    };
    Ok(collect_valid(items, Contradiction::is_valid, "contradiction"))
}
