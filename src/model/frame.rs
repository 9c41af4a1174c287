//! Typed columnar query results.
//!
//! The query collaborator answers with loosely typed JSON columns
//! ([`WireResponse`]). They are converted once, at the boundary, into a
//! [`QueryFrame`] of named typed columns; nothing past the boundary sees
//! `serde_json::Value`.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::filter::LABEL_PREFIX;
use super::types::LogLevel;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("column '{column}' row {row}: expected {expected}")]
    InvalidValue {
        column: String,
        row: usize,
        expected: &'static str,
    },

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumns {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("column '{column}' changed type from {from} to {to}")]
    KindMismatch {
        column: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("chunk is missing column '{0}'")]
    MissingColumn(String),
}

// -------------------------------------------------------------------------
// Wire format
// -------------------------------------------------------------------------

/// Column type tag as reported by the collaborator.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireType {
    Time,
    Number,
    #[default]
    String,
    Boolean,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WireColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: WireType,
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub message: String,
}

/// Raw answer of the query collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    #[serde(default)]
    pub columns: Vec<WireColumn>,
    #[serde(default)]
    pub errors: Vec<WireError>,
}

// -------------------------------------------------------------------------
// Typed columns
// -------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValues {
    Time(Vec<DateTime<Utc>>),
    Number(Vec<f64>),
    Text(Vec<String>),
    /// String-to-string maps, e.g. the `labels` projection.
    Labels(Vec<BTreeMap<String, String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Time(v) => v.len(),
            Self::Number(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Labels(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Time(_) => "time",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Labels(_) => "labels",
        }
    }

    /// Render one cell as text.
    pub fn text_at(&self, row: usize) -> Option<String> {
        match self {
            Self::Time(v) => v
                .get(row)
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Number(v) => v.get(row).map(|n| format_number(*n)),
            Self::Text(v) => v.get(row).cloned(),
            Self::Labels(v) => v
                .get(row)
                .map(|m| serde_json::to_string(m).unwrap_or_default()),
        }
    }

    fn extend(&mut self, column: &str, other: ColumnValues) -> Result<(), FrameError> {
        match (self, other) {
            (Self::Time(a), Self::Time(b)) => a.extend(b),
            (Self::Number(a), Self::Number(b)) => a.extend(b),
            (Self::Text(a), Self::Text(b)) => a.extend(b),
            (Self::Labels(a), Self::Labels(b)) => a.extend(b),
            (a, b) => {
                return Err(FrameError::KindMismatch {
                    column: column.to_string(),
                    from: a.kind_name(),
                    to: b.kind_name(),
                });
            }
        }
        Ok(())
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(name, ColumnValues::Text(values))
    }
}

/// A columnar result set. All columns have the same length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryFrame {
    columns: Vec<Column>,
}

impl QueryFrame {
    pub fn new(columns: Vec<Column>) -> Result<Self, FrameError> {
        if let Some(first) = columns.first() {
            let expected = first.values.len();
            for col in &columns {
                if col.values.len() != expected {
                    return Err(FrameError::RaggedColumns {
                        column: col.name.clone(),
                        expected,
                        actual: col.values.len(),
                    });
                }
            }
        }
        Ok(Self { columns })
    }

    /// Convert collaborator columns into typed columns.
    pub fn from_wire(columns: Vec<WireColumn>) -> Result<Self, FrameError> {
        let typed = columns
            .into_iter()
            .map(convert_column)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(typed)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn text_at(&self, column: &str, row: usize) -> Option<String> {
        self.column(column).and_then(|c| c.values.text_at(row))
    }

    /// Merge a later chunk into this frame. The first non-empty merge adopts
    /// the chunk's schema; later merges append each column's rows by name.
    pub fn append(&mut self, chunk: QueryFrame) -> Result<(), FrameError> {
        if self.columns.is_empty() {
            *self = chunk;
            return Ok(());
        }
        let mut incoming: BTreeMap<String, ColumnValues> = chunk
            .columns
            .into_iter()
            .map(|c| (c.name, c.values))
            .collect();
        for col in &mut self.columns {
            let values = incoming
                .remove(&col.name)
                .ok_or_else(|| FrameError::MissingColumn(col.name.clone()))?;
            col.values.extend(&col.name, values)?;
        }
        Ok(())
    }

    /// Count rows per known level from the `level` column.
    pub fn level_counts(&self) -> Vec<(LogLevel, usize)> {
        let mut counts: Vec<(LogLevel, usize)> = LogLevel::ALL.iter().map(|l| (*l, 0)).collect();
        if let Some(ColumnValues::Text(levels)) = self.column("level").map(|c| &c.values) {
            for level in levels.iter().filter_map(|l| LogLevel::parse(l)) {
                if let Some(slot) = counts.iter_mut().find(|(l, _)| *l == level) {
                    slot.1 += 1;
                }
            }
        }
        counts
    }

    /// Distinct values per field, in first-seen order. The `labels` map
    /// column fans out into one `labels.<key>` entry per map key.
    pub fn distinct_values(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for col in &self.columns {
            match &col.values {
                ColumnValues::Labels(maps) => {
                    for map in maps {
                        for (k, v) in map {
                            let key = format!("{LABEL_PREFIX}{k}");
                            if seen.insert((key.clone(), v.clone())) {
                                out.entry(key).or_default().push(v.clone());
                            }
                        }
                    }
                }
                values => {
                    let entry = out.entry(col.name.clone()).or_default();
                    for row in 0..values.len() {
                        if let Some(v) = values.text_at(row)
                            && seen.insert((col.name.clone(), v.clone()))
                        {
                            entry.push(v);
                        }
                    }
                }
            }
        }
        out
    }
}

fn convert_column(col: WireColumn) -> Result<Column, FrameError> {
    let WireColumn { name, kind, values } = col;
    let typed = match kind {
        WireType::Time => {
            let mut out = Vec::with_capacity(values.len());
            for (row, v) in values.iter().enumerate() {
                out.push(parse_time_value(v).ok_or_else(|| FrameError::InvalidValue {
                    column: name.clone(),
                    row,
                    expected: "timestamp",
                })?);
            }
            ColumnValues::Time(out)
        }
        WireType::Number => {
            let mut out = Vec::with_capacity(values.len());
            for (row, v) in values.iter().enumerate() {
                let n = match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.parse::<f64>().ok(),
                    Value::Null => Some(f64::NAN),
                    _ => None,
                };
                out.push(n.ok_or_else(|| FrameError::InvalidValue {
                    column: name.clone(),
                    row,
                    expected: "number",
                })?);
            }
            ColumnValues::Number(out)
        }
        WireType::String | WireType::Boolean => {
            ColumnValues::Text(values.iter().map(value_to_text).collect())
        }
        WireType::Other => {
            if values.iter().all(|v| v.is_object() || v.is_null()) {
                ColumnValues::Labels(values.iter().map(value_to_map).collect())
            } else {
                ColumnValues::Text(values.iter().map(value_to_text).collect())
            }
        }
    };
    Ok(Column::new(name, typed))
}

fn parse_time_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let ms = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(ms).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(|n| n.and_utc())
            }),
        _ => None,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_map(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| (k.clone(), value_to_text(v)))
            .collect(),
        _ => BTreeMap::new(),
    }
}
