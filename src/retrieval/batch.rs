//! One-shot retrieval: label discovery, log rows and the level histogram
//! run concurrently; the call returns once all three have settled.

use crossbeam_channel::unbounded;
use tracing::{debug, warn};

use super::{QueryError, QueryExecutor, QueryRequest, fetch_frame};
use crate::model::frame::QueryFrame;
use crate::query::builder::{LogSchema, generate_histogram_query};
use crate::query::time::TimeRange;

/// Which state slice a batch result feeds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BatchSlice {
    Labels,
    Logs,
    Histogram,
}

impl BatchSlice {
    fn as_str(self) -> &'static str {
        match self {
            Self::Labels => "labels",
            Self::Logs => "logs",
            Self::Histogram => "histogram",
        }
    }
}

/// The three requests of one batch refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    pub labels: QueryRequest,
    pub logs: QueryRequest,
    pub histogram: QueryRequest,
}

impl BatchPlan {
    pub fn new(schema: &LogSchema, query: &str, time_range: TimeRange, data_source: &str) -> Self {
        let logs = QueryRequest::new(query, time_range, data_source);
        Self {
            labels: logs.with_query(schema.label_keys_query()),
            histogram: logs.with_query(generate_histogram_query(query)),
            logs,
        }
    }

    fn requests(&self) -> [(BatchSlice, &QueryRequest); 3] {
        [
            (BatchSlice::Labels, &self.labels),
            (BatchSlice::Logs, &self.logs),
            (BatchSlice::Histogram, &self.histogram),
        ]
    }
}

/// Run the plan. `on_slice` receives each successful result as it arrives;
/// the first failure (in arrival order) is returned once every request has
/// settled. Failures do not discard sibling results.
pub fn run_batch(
    executor: &dyn QueryExecutor,
    plan: &BatchPlan,
    mut on_slice: impl FnMut(BatchSlice, QueryFrame),
) -> Option<QueryError> {
    let (tx, rx) = unbounded();
    let mut first_error = None;
    std::thread::scope(|scope| {
        for (slice, request) in plan.requests() {
            let tx = tx.clone();
            scope.spawn(move || {
                let _ = tx.send((slice, fetch_frame(executor, request)));
            });
        }
        drop(tx);

        for (slice, result) in rx.iter() {
            match result {
                Ok(frame) => {
                    debug!(slice = slice.as_str(), rows = frame.row_count(), "batch slice settled");
                    on_slice(slice, frame);
                }
                Err(e) => {
                    warn!(slice = slice.as_str(), error = %e, "batch slice failed");
                    first_error.get_or_insert(e);
                }
            }
        }
    });
    first_error
}
