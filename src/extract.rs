//! Structured payload extraction from model replies
//!
//! Two jobs: find a delimiter-bounded JSON block inside conversational text,
//! and turn a reply that should be pure JSON into a parsed object. Neither
//! checks fields; any syntactically valid JSON object is accepted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use thiserror::Error;

/// Parsed JSON object produced by an engine
pub type StructuredResult = Map<String, Value>;

/// Literal markers around an embedded block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMarkers {
    pub open: String,
    pub close: String,
}

impl BlockMarkers {
    #[cfg(test)]
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }
}

/// Outcome of scanning a reply for an embedded block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockScan<'a> {
    /// No opening marker, or an opening marker that is never closed
    NotFound,
    Found {
        prefix: &'a str,
        json: &'a str,
        suffix: &'a str,
    },
}

/// Locate the first block between `markers`.
///
/// Single pass, no nesting: the first opening marker pairs with the first
/// closing marker after it.
pub fn scan_block<'a>(text: &'a str, markers: &BlockMarkers) -> BlockScan<'a> {
    let Some((prefix, rest)) = text.split_once(markers.open.as_str()) else {
        return BlockScan::NotFound;
    };
    let Some((json, suffix)) = rest.split_once(markers.close.as_str()) else {
        return BlockScan::NotFound;
    };
    BlockScan::Found {
        prefix,
        json,
        suffix,
    }
}

/// Why a payload could not be turned into a structured result
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("reply was empty")]
    Empty,
    #[error("reply is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("reply is JSON but not an object")]
    NotAnObject,
}

/// Drop every line that is nothing but a code fence (```` ``` ```` or
/// ```` ```json ````). Text without such lines is returned untouched.
pub fn strip_code_fences(text: &str) -> Cow<'_, str> {
    if !text.lines().any(is_fence_line) {
        return Cow::Borrowed(text);
    }
    let kept: Vec<&str> = text.lines().filter(|line| !is_fence_line(line)).collect();
    Cow::Owned(kept.join("\n"))
}

fn is_fence_line(line: &str) -> bool {
    line.trim().strip_prefix("```").is_some_and(|tag| {
        tag.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.'))
    })
}

/// Parse a reply that is expected to be exactly one JSON object
pub fn parse_payload(text: &str) -> Result<StructuredResult, PayloadError> {
    let normalized = strip_code_fences(text);
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return Err(PayloadError::Empty);
    }
    match serde_json::from_str::<Value>(trimmed)? {
        Value::Object(map) => Ok(map),
        _ => Err(PayloadError::NotAnObject),
    }
}

/// What a conversational turn shows and what it evaluated to
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub display_text: String,
    pub result: Option<StructuredResult>,
}

/// Split a conversational reply into display text and an optional result.
///
/// A missing, unterminated or unparsable block is not an error: the whole
/// reply is shown and no result is produced.
pub fn extract_embedded(raw: &str, markers: &BlockMarkers) -> Extraction {
    if let BlockScan::Found {
        prefix,
        json,
        suffix,
    } = scan_block(raw, markers)
    {
        match parse_payload(json) {
            Ok(result) => {
                return Extraction {
                    display_text: format!("{prefix}{suffix}").trim().to_string(),
                    result: Some(result),
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Embedded block present but unparsable");
            }
        }
    }

    Extraction {
        display_text: raw.trim().to_string(),
        result: None,
    }
}
