//! Filter predicates and the pure list transforms applied to them.
//!
//! A filter list is edited only through [`add`], [`remove`] and [`only`].
//! `add` toggles: adding a filter that is already present removes it.
//! Filters keyed `timestamp` are owned by time-range logic and are never
//! added or removed here.

use serde::{Deserialize, Deserializer, Serialize};

/// Key reserved for time-range predicates.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Namespace prefix of label keys (`labels.app`, `labels.team`, ...).
pub const LABEL_PREFIX: &str = "labels.";

/// Comparison operator of a [`Filter`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperation {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    /// Case-insensitive substring match.
    #[serde(rename = "~")]
    Contains,
}

impl FilterOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Contains => "~",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "=" => Some(Self::Eq),
            "!=" => Some(Self::NotEq),
            "~" => Some(Self::Contains),
            _ => None,
        }
    }
}

impl std::fmt::Display for FilterOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One predicate: `key operation value`. Equality is structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub operation: FilterOperation,
    #[serde(deserialize_with = "value_as_string")]
    pub value: String,
}

impl Filter {
    pub fn new(key: impl Into<String>, operation: FilterOperation, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operation,
            value: value.into(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, FilterOperation::Eq, value)
    }

    /// The attribute name for label-keyed filters (`labels.app` -> `app`).
    pub fn label_key(&self) -> Option<&str> {
        self.key.strip_prefix(LABEL_PREFIX)
    }

    pub fn is_timestamp(&self) -> bool {
        self.key == TIMESTAMP_KEY
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.key, self.operation, self.value)
    }
}

/// Stored filters may carry numbers or booleans as values; keep them as text.
fn value_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Toggle `filter` into the list: removes it when present, appends otherwise.
pub fn add(filters: &[Filter], filter: &Filter) -> Vec<Filter> {
    if filter.is_timestamp() {
        return filters.to_vec();
    }
    if filters.contains(filter) {
        return remove(filters, filter);
    }
    let mut next = filters.to_vec();
    next.push(filter.clone());
    next
}

/// Remove the first element equal to `filter`.
pub fn remove(filters: &[Filter], filter: &Filter) -> Vec<Filter> {
    let mut next = filters.to_vec();
    if filter.is_timestamp() {
        return next;
    }
    if let Some(pos) = next.iter().position(|f| f == filter) {
        next.remove(pos);
    }
    next
}

/// Replace the whole list with `filter`.
pub fn only(_filters: &[Filter], filter: &Filter) -> Vec<Filter> {
    vec![filter.clone()]
}
