//! SQL generation for the log table.
//!
//! Every generated statement keeps `$__fromTime` / `$__toTime` /
//! `$__timeFilter(...)` placeholders; the query executor substitutes the
//! actual window. User-supplied text is always emitted through
//! [`escape_literal`] and never spliced raw.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::filter::{Filter, FilterOperation, LABEL_PREFIX};
use crate::model::types::{LogLevel, Mode, RowSelection, UserState};

/// Default number of rows fetched by the batch protocol.
pub const DEFAULT_ROW_LIMIT: usize = 20_000;

/// Map column holding per-row attributes (labels).
const ATTRIBUTES_COLUMN: &str = "LogAttributes";

static PLAIN_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));
static TRAILING_LIMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+LIMIT\s+\d+\s*$").expect("trailing limit regex"));

/// Escape a string for use inside a single-quoted ClickHouse literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Escape `LIKE` wildcards so `value` matches literally.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn quote_identifier(ident: &str) -> String {
    if PLAIN_IDENT.is_match(ident) {
        ident.to_string()
    } else {
        format!("`{}`", ident.replace('`', "``"))
    }
}

/// SQL expression a filter key refers to. Label keys subscript the
/// attributes map with the namespace prefix dropped.
fn filter_expression(filter: &Filter) -> String {
    match filter.label_key() {
        Some(label) => format!("{ATTRIBUTES_COLUMN}['{}']", escape_literal(label)),
        None => quote_identifier(&filter.key),
    }
}

fn filter_clause(filter: &Filter) -> String {
    let expr = filter_expression(filter);
    match filter.operation {
        FilterOperation::Contains => format!(
            "AND ( {expr} ILIKE '%{}%' )",
            escape_literal(&escape_like(&filter.value))
        ),
        op => format!("AND ( {expr} {op} '{}' )", escape_literal(&filter.value)),
    }
}

fn level_list(levels: &[LogLevel]) -> String {
    levels
        .iter()
        .map(|l| format!("'{}'", l.as_str()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Tables the generated statements read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSchema {
    pub table: String,
    pub label_table: String,
}

impl Default for LogSchema {
    fn default() -> Self {
        Self {
            table: "otel_logs_cc".to_string(),
            label_table: "otel_logs".to_string(),
        }
    }
}

impl LogSchema {
    pub fn new(table: impl Into<String>, label_table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            label_table: label_table.into(),
        }
    }

    /// Main log query over the configured table.
    pub fn log_query(
        &self,
        search_term: &str,
        label_keys: &[String],
        filters: &[Filter],
        levels: &[LogLevel],
        row_limit: usize,
    ) -> String {
        let labels = if label_keys.is_empty() {
            "map() AS \"labels\"".to_string()
        } else {
            let pairs = label_keys
                .iter()
                .map(|key| {
                    let name = escape_literal(key.strip_prefix(LABEL_PREFIX).unwrap_or(key));
                    format!("'{name}', {ATTRIBUTES_COLUMN}['{name}']")
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("map({pairs}) AS \"labels\"")
        };

        let mut sql = format!(
            "SELECT\n  \
             Timestamp AS \"timestamp\",\n  \
             Body AS \"body\",\n  \
             SeverityText AS \"level\",\n  \
             {labels},\n  \
             AppName AS \"app\",\n  \
             ComponentName AS \"service\",\n  \
             TraceId AS \"traceID\",\n  \
             SpanId AS \"spanID\"\n\
             FROM {table}\n\
             WHERE\n  \
             ( timestamp >= $__fromTime AND timestamp <= $__toTime )\n  \
             AND ( body ILIKE '%{search}%' )\n  \
             AND level IN ({known})",
            table = quote_identifier(&self.table),
            search = escape_literal(&escape_like(search_term)),
            known = level_list(&LogLevel::ALL),
        );

        if !levels.is_empty() && !LogLevel::covers_all(levels) {
            sql.push_str(&format!("\n  AND ( level IN ({}) )", level_list(levels)));
        }
        for filter in filters {
            sql.push_str("\n  ");
            sql.push_str(&filter_clause(filter));
        }
        sql.push_str(&format!("\nORDER BY timestamp DESC\nLIMIT {row_limit}"));
        sql
    }

    /// Distinct attribute keys seen inside the time window.
    pub fn label_keys_query(&self) -> String {
        format!(
            "SELECT DISTINCT arrayJoin(mapKeys({ATTRIBUTES_COLUMN})) AS key\n\
             FROM {}\n\
             WHERE $__timeFilter(Timestamp)",
            quote_identifier(&self.label_table)
        )
    }

    /// Single-row query for the detail view of `selection`, projecting the
    /// full attribute map.
    pub fn row_detail_query(&self, selection: &RowSelection) -> String {
        format!(
            "SELECT\n  \
             Timestamp AS \"timestamp\",\n  \
             Body AS \"body\",\n  \
             SeverityText AS \"level\",\n  \
             {ATTRIBUTES_COLUMN} AS \"labels\",\n  \
             AppName AS \"app\",\n  \
             ComponentName AS \"service\",\n  \
             TraceId AS \"traceID\",\n  \
             SpanId AS \"spanID\"\n\
             FROM {table}\n\
             WHERE\n  \
             Timestamp = parseDateTime64BestEffort('{ts}', 9)\n  \
             AND AppName = '{app}'\n  \
             AND ComponentName = '{service}'\n  \
             AND Body = '{body}'\n\
             LIMIT 1",
            table = quote_identifier(&self.table),
            ts = escape_literal(&selection.timestamp),
            app = escape_literal(&selection.app),
            service = escape_literal(&selection.service),
            body = escape_literal(&selection.body),
        )
    }

    /// The query actually sent for `state`: raw SQL in SQL mode, builder
    /// output otherwise. SQL mode without text resolves to an empty query.
    pub fn resolve(&self, state: &UserState, row_limit: usize) -> String {
        match state.mode {
            Mode::Sql => state.sql_expression.clone().unwrap_or_default(),
            Mode::Normal => self.log_query(
                &state.search_term,
                &state.selected_labels,
                &state.filters,
                &state.log_levels,
                row_limit,
            ),
        }
    }
}

/// [`LogSchema::log_query`] against the default tables.
pub fn generate_log_query(
    search_term: &str,
    label_keys: &[String],
    filters: &[Filter],
    levels: &[LogLevel],
    row_limit: usize,
) -> String {
    LogSchema::default().log_query(search_term, label_keys, filters, levels, row_limit)
}

/// Bucket the rows of `filtered_query` into per-level counts over an
/// adaptive interval derived from the requested window.
pub fn generate_histogram_query(filtered_query: &str) -> String {
    format!(
        "WITH\n  \
         $__toTime - $__fromTime AS total_time,\n  \
         CASE\n    \
         WHEN total_time < 10 THEN total_time / 1\n    \
         WHEN total_time < 60 THEN total_time / 5\n    \
         WHEN total_time < 120 THEN total_time / 50\n    \
         ELSE total_time / 100\n  \
         END AS slot_duration,\n  \
         filtered_logs AS (\n{filtered_query}\n  )\n\
         SELECT\n  \
         toStartOfInterval(timestamp, INTERVAL slot_duration SECOND) AS time,\n  \
         countIf(level = 'DEBUG') AS DEBUG,\n  \
         countIf(level = 'INFO') AS INFO,\n  \
         countIf(level = 'WARN') AS WARN,\n  \
         countIf(level = 'ERROR') AS ERROR,\n  \
         countIf(level = 'FATAL') AS FATAL\n\
         FROM filtered_logs\n\
         GROUP BY time\n\
         ORDER BY time"
    )
}

/// Replace a trailing `LIMIT n` on `query` with `LIMIT offset, chunk`.
pub fn paginate(query: &str, offset: usize, chunk: usize) -> String {
    let base = TRAILING_LIMIT.replace(query, "");
    format!("{base} LIMIT {offset}, {chunk}")
}
