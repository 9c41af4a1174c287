//! Session state types.
//!
//! [`UserState`] is the query definition an operator edits: it is the only
//! state that is persisted or mirrored into the URL. Its serialized field
//! names are stable because saved views and share links depend on them.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::filter::{Filter, LABEL_PREFIX};
use super::frame::QueryFrame;

// -------------------------------------------------------------------------
// Log levels
// -------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Every known level, lowest severity first.
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            "FATAL" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// True when `levels` enables every known level.
    pub fn covers_all(levels: &[LogLevel]) -> bool {
        Self::ALL.iter().all(|l| levels.contains(l))
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------------------------------------------------------------------------
// Mode / selection / view
// -------------------------------------------------------------------------

/// Whether the resolved query comes from the builder or from raw SQL.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Sql,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Sql => "sql",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(Self::Normal),
            "sql" => Some(Self::Sql),
            _ => None,
        }
    }
}

/// Composite key of one log row, used to fetch its details.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSelection {
    pub timestamp: String,
    pub app: String,
    pub service: String,
    pub body: String,
}

impl RowSelection {
    /// Build the selection for row `row` of `frame`. Missing columns yield
    /// empty components.
    pub fn from_frame(frame: &QueryFrame, row: usize) -> Self {
        let cell = |name: &str| frame.text_at(name, row).unwrap_or_default();
        Self {
            timestamp: cell("timestamp"),
            app: cell("app"),
            service: cell("service"),
            body: cell("body"),
        }
    }
}

/// The live default view or a named saved view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViewId {
    #[default]
    Default,
    Named(String),
}

impl ViewId {
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

// -------------------------------------------------------------------------
// Notifications
// -------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Copied,
    Saved,
    Deleted,
}

/// Transient message shown to the operator; expires on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub raised_at: Instant,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raised_at: Instant::now(),
        }
    }
}

// -------------------------------------------------------------------------
// User state
// -------------------------------------------------------------------------

/// Data source selected when nothing else says otherwise.
pub const DEFAULT_DATA_SOURCE: &str = "datasource-clickhouse-apps";

/// Fixed (non-label) field keys of a log row.
pub const FIELD_KEYS: [&str; 5] = ["level", "timestamp", "traceID", "spanID", "body"];

pub const DEFAULT_LABELS: [&str; 3] = ["labels.app", "labels.component", "labels.team"];

/// The query definition of one panel session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserState {
    pub mode: Mode,
    pub sql_expression: Option<String>,
    pub search_term: String,
    pub filters: Vec<Filter>,
    pub time_from: String,
    pub time_to: String,
    pub datasource: String,
    pub log_levels: Vec<LogLevel>,
    pub refresh_interval: String,
    pub selected_row: Option<RowSelection>,
    pub selected_fields: Vec<String>,
    pub selected_labels: Vec<String>,
    pub streaming_mode: bool,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            mode: Mode::Normal,
            sql_expression: None,
            search_term: String::new(),
            filters: Vec::new(),
            time_from: "now-5m".to_string(),
            time_to: "now".to_string(),
            datasource: DEFAULT_DATA_SOURCE.to_string(),
            log_levels: LogLevel::ALL.to_vec(),
            refresh_interval: String::new(),
            selected_row: None,
            selected_fields: FIELD_KEYS.iter().map(|s| s.to_string()).collect(),
            selected_labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            streaming_mode: false,
        }
    }
}

impl UserState {
    pub fn with_datasource(mut self, datasource: impl Into<String>) -> Self {
        self.datasource = datasource.into();
        self
    }
}

// -------------------------------------------------------------------------
// Display helpers
// -------------------------------------------------------------------------

/// Table column order: selected fixed fields in `keys` order, then selected
/// labels, with `body` moved to the end.
pub fn display_columns(keys: &[&str], selected_fields: &[String], labels: &[String]) -> Vec<String> {
    let fields: Vec<String> = keys
        .iter()
        .filter(|k| selected_fields.iter().any(|s| s == *k))
        .map(|k| k.to_string())
        .collect();
    let has_body = fields.iter().any(|f| f == "body");
    let mut out: Vec<String> = fields.into_iter().filter(|f| f != "body").collect();
    out.extend(labels.iter().cloned());
    if has_body {
        out.push("body".to_string());
    }
    out
}

/// Column header for a field key.
pub fn header_name(key: &str) -> String {
    if let Some(label) = key.strip_prefix(LABEL_PREFIX) {
        return label.to_string();
    }
    match key {
        "timestamp" => "date".to_string(),
        "body" => "message".to_string(),
        other => other.to_string(),
    }
}
