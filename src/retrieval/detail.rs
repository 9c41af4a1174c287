//! Single-row detail fetch.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{QueryError, QueryExecutor, QueryRequest, fetch_frame};
use crate::model::frame::{ColumnValues, QueryFrame};
use crate::model::types::RowSelection;
use crate::query::builder::LogSchema;
use crate::query::time::TimeRange;

/// Placeholder substituted in trace link templates.
pub const TRACE_ID_PLACEHOLDER: &str = "{{ traceID }}";

/// Fields and labels of one log row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogDetail {
    pub fields: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl LogDetail {
    /// Detail of the first row of `frame`; `None` when it has no rows.
    pub fn from_frame(frame: &QueryFrame) -> Option<Self> {
        if frame.is_empty() {
            return None;
        }
        let mut detail = Self::default();
        for column in frame.columns() {
            match &column.values {
                ColumnValues::Labels(maps) => {
                    if let Some(map) = maps.first() {
                        detail.labels.extend(map.clone());
                    }
                }
                values => {
                    if let Some(text) = values.text_at(0) {
                        detail.fields.insert(column.name.clone(), text);
                    }
                }
            }
        }
        Some(detail)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.field("traceID").filter(|id| !id.is_empty())
    }
}

/// Fetch the detail row for `selection`.
pub fn fetch_detail(
    executor: &dyn QueryExecutor,
    schema: &LogSchema,
    selection: &RowSelection,
    time_range: TimeRange,
    data_source: &str,
) -> Result<Option<LogDetail>, QueryError> {
    let request = QueryRequest::new(schema.row_detail_query(selection), time_range, data_source);
    let frame = fetch_frame(executor, &request)?;
    Ok(LogDetail::from_frame(&frame))
}

/// Link to a trace viewer for `trace_id`.
pub fn trace_url(template: &str, trace_id: &str) -> String {
    template.replace(TRACE_ID_PLACEHOLDER, trace_id)
}
