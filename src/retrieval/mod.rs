//! Retrieval engine.
//!
//! All database access goes through a [`QueryExecutor`]. Its loosely typed
//! answer is converted to a [`QueryFrame`] in [`fetch_frame`]; nothing
//! downstream sees wire values.
//!
//! - **[`batch`]**: labels, logs and histogram fetched concurrently in one shot
//! - **[`stream`]**: paginated, cancellable, incrementally merged log fetch
//! - **[`refresh`]**: deadline-based auto-refresh timer
//! - **[`detail`]**: single-row detail fetch

pub mod batch;
pub mod detail;
pub mod refresh;
pub mod stream;

use thiserror::Error;

pub use crate::model::frame::{WireColumn, WireError, WireResponse, WireType};
use crate::model::frame::{FrameError, QueryFrame};
use crate::query::time::TimeRange;

pub use batch::{BatchPlan, BatchSlice, run_batch};
pub use detail::LogDetail;
pub use refresh::AutoRefresh;
pub use stream::{StreamConfig, StreamHandle, StreamOutcome, run_stream};

/// Failure of one collaborator call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The backend rejected the query; the message is shown verbatim.
    #[error("{0}")]
    Backend(String),

    /// The executor could not reach the backend.
    #[error("{0}")]
    Transport(String),

    #[error("malformed query result: {0}")]
    Malformed(#[from] FrameError),
}

/// One query execution request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub time_range: TimeRange,
    pub data_source: String,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, time_range: TimeRange, data_source: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            time_range,
            data_source: data_source.into(),
        }
    }

    /// Same window and data source, different statement.
    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            time_range: self.time_range,
            data_source: self.data_source.clone(),
        }
    }
}

/// The external query-execution capability.
///
/// Implementations may block; the engine always calls them off the session
/// thread.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, request: &QueryRequest) -> Result<WireResponse, QueryError>;
}

/// Execute `request` and convert the answer. A response carrying errors
/// fails with the first error's message.
pub fn fetch_frame(executor: &dyn QueryExecutor, request: &QueryRequest) -> Result<QueryFrame, QueryError> {
    let response = executor.execute(request)?;
    if let Some(first) = response.errors.first() {
        let message = if first.message.is_empty() {
            "Query failed".to_string()
        } else {
            first.message.clone()
        };
        return Err(QueryError::Backend(message));
    }
    Ok(QueryFrame::from_wire(response.columns)?)
}

/// Identity of a resolved retrieval: the change detector compares these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub query: String,
    pub data_source: String,
    pub time_from: String,
    pub time_to: String,
}

impl RequestKey {
    /// Stable text form, used to reset timers keyed on the request.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.query, self.data_source, self.time_from, self.time_to
        )
    }
}

/// Results flowing from worker threads back to the session. Every variant
/// carries the generation it was started under; stale ones are dropped.
#[derive(Debug, Clone)]
pub enum RetrievalEvent {
    Slice {
        generation: u64,
        slice: BatchSlice,
        frame: QueryFrame,
    },
    BatchSettled {
        generation: u64,
        error: Option<QueryError>,
    },
    StreamUpdate {
        generation: u64,
        frame: QueryFrame,
        complete: bool,
    },
    StreamFailed {
        generation: u64,
        error: QueryError,
    },
    Histogram {
        generation: u64,
        result: Result<QueryFrame, QueryError>,
    },
    Detail {
        generation: u64,
        result: Result<Option<LogDetail>, QueryError>,
    },
    /// A worker thread exited.
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    struct Fixed(WireResponse);

    impl QueryExecutor for Fixed {
        fn execute(&self, _request: &QueryRequest) -> Result<WireResponse, QueryError> {
            Ok(self.0.clone())
        }
    }

    fn request() -> QueryRequest {
        let now = Utc::now();
        QueryRequest::new("SELECT 1", TimeRange::new(now, now), "ds")
    }

    #[test]
    fn first_error_message_wins() {
        let exec = Fixed(WireResponse {
            columns: vec![],
            errors: vec![
                WireError { message: "Code: 62. Syntax error".into() },
                WireError { message: "second".into() },
            ],
        });
        let err = fetch_frame(&exec, &request()).unwrap_err();
        assert_eq!(err.to_string(), "Code: 62. Syntax error");
    }

    #[test]
    fn empty_error_message_gets_default() {
        let exec = Fixed(WireResponse {
            columns: vec![],
            errors: vec![WireError { message: String::new() }],
        });
        assert_eq!(fetch_frame(&exec, &request()).unwrap_err().to_string(), "Query failed");
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let frame = fetch_frame(&Fixed(WireResponse::default()), &request()).unwrap();
        assert_eq!(frame.row_count(), 0);
    }

    #[test]
    fn wire_columns_are_converted() {
        let exec = Fixed(WireResponse {
            columns: vec![WireColumn {
                name: "key".into(),
                kind: WireType::String,
                values: vec![json!("app"), json!("team")],
            }],
            errors: vec![],
        });
        let frame = fetch_frame(&exec, &request()).unwrap();
        assert_eq!(frame.text_at("key", 1).as_deref(), Some("team"));
    }
}
