//! Search-expression tokenizer.
//!
//! One text buffer mixes free text with inline filter tokens:
//!
//! ```text
//! #level=ERROR# #labels.app~api# connection timeout
//! ```
//!
//! Completed tokens (`#key<op>value#`, `<op>` one of `=`, `!=`, `~`) become
//! [`Filter`]s. An unterminated token at the end drives autocomplete: after
//! an operator it completes values, before one it completes keys.

use std::collections::BTreeMap;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::model::filter::{Filter, FilterOperation};
use crate::model::frame::QueryFrame;
use crate::model::types::FIELD_KEYS;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([A-Za-z0-9_.\-]+)(!=|=|~)([^#]+)#").expect("token regex"));
static PARTIAL_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([A-Za-z0-9_.\-]+)(!=|=|~)([^#]*)").expect("partial value regex"));
static PARTIAL_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([A-Za-z0-9_.\-]*)").expect("partial key regex"));
static ANY_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\S*\s?").expect("strip regex"));
static SUGGESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_.\-]+)(!=|=|~)(.*)$").expect("suggestion regex"));

/// Result of stripping completed tokens out of a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedInput {
    /// Completed tokens, in buffer order.
    pub filters: Vec<Filter>,
    /// The buffer with completed tokens removed (partial tokens kept).
    pub remainder: String,
}

/// Extract every completed `#key<op>value#` token.
pub fn extract_tokens(text: &str) -> ParsedInput {
    let filters = TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let op = FilterOperation::parse(&caps[2])?;
            Some(Filter::new(&caps[1], op, &caps[3]))
        })
        .collect();
    let remainder = TOKEN.replace_all(text, "").into_owned();
    ParsedInput { filters, remainder }
}

/// The free-text part of a buffer: everything that is not a `#` token,
/// trimmed.
pub fn free_text(text: &str) -> String {
    ANY_TOKEN.replace_all(text, "").trim().to_string()
}

/// Byte range of the unterminated token being typed, if any.
pub fn in_progress_range(text: &str) -> Option<Range<usize>> {
    PARTIAL_VALUE
        .find(text)
        .or_else(|| PARTIAL_KEY.find(text))
        .map(|m| m.range())
}

/// Rewrite the in-progress token of `text` to `#suggestion`.
pub fn complete_token(text: &str, suggestion: &str) -> Option<String> {
    let range = in_progress_range(text)?;
    Some(format!("{}#{}{}", &text[..range.start], suggestion, &text[range.end..]))
}

/// Parse a `key<op>value` suggestion back into a filter.
pub fn suggestion_filter(suggestion: &str) -> Option<Filter> {
    let caps = SUGGESTION.captures(suggestion)?;
    let op = FilterOperation::parse(&caps[2])?;
    Some(Filter::new(&caps[1], op, &caps[3]))
}

/// Known keys and values autocomplete draws from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionContext {
    pub keys: Vec<String>,
    pub values: BTreeMap<String, Vec<String>>,
}

impl CompletionContext {
    /// Candidates from the currently loaded rows and discovered labels.
    pub fn from_frame(frame: &QueryFrame, labels: &[String]) -> Self {
        let mut keys: Vec<String> = FIELD_KEYS.iter().map(|k| k.to_string()).collect();
        for label in labels {
            if !keys.contains(label) {
                keys.push(label.clone());
            }
        }
        Self {
            keys,
            values: frame.distinct_values(),
        }
    }
}

/// Autocomplete suggestions for a buffer with completed tokens already
/// stripped. Value suggestions are formatted `key<op>value`.
pub fn suggestions_for(text: &str, ctx: &CompletionContext) -> Vec<String> {
    if !text.contains('#') {
        return Vec::new();
    }
    if let Some(caps) = PARTIAL_VALUE.captures(text) {
        let (key, op, partial) = (&caps[1], &caps[2], &caps[3]);
        return ctx
            .values
            .get(key)
            .map(|candidates| {
                candidates
                    .iter()
                    .filter(|v| v.contains(partial))
                    .map(|v| format!("{key}{op}{v}"))
                    .collect()
            })
            .unwrap_or_default();
    }
    match PARTIAL_KEY.captures(text) {
        Some(caps) => ctx
            .keys
            .iter()
            .filter(|k| k.starts_with(&caps[1]))
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}
