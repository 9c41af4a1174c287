//! Chunked streaming retrieval.
//!
//! The base query is re-issued with `LIMIT offset, chunk` until a chunk
//! comes back empty or short. Each chunk is merged into an accumulator and
//! the whole snapshot is handed to the caller together with a completion
//! flag. A cancellation flag is checked before every fetch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info};

use super::{QueryError, QueryExecutor, QueryRequest, fetch_frame};
use crate::error::CarboncatError;
use crate::model::frame::QueryFrame;
use crate::query::builder::paginate;

/// Rows requested per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Pause between chunks, so consumers are not flooded.
pub const DEFAULT_CHUNK_PAUSE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub chunk_size: usize,
    pub pause: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pause: DEFAULT_CHUNK_PAUSE,
        }
    }
}

/// How a stream ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { rows: usize, fetches: usize },
    Cancelled { rows: usize, fetches: usize },
}

/// Drive one stream to completion, cancellation or failure.
///
/// A short final chunk is merged and reported complete in the same update;
/// when the total is an exact multiple of the chunk size, one extra empty
/// fetch detects the end.
pub fn run_stream(
    executor: &dyn QueryExecutor,
    request: &QueryRequest,
    config: StreamConfig,
    cancel: &AtomicBool,
    mut on_update: impl FnMut(&QueryFrame, bool),
) -> Result<StreamOutcome, QueryError> {
    let chunk_size = config.chunk_size.max(1);
    let mut accumulated = QueryFrame::default();
    let mut offset = 0usize;
    let mut fetches = 0usize;

    loop {
        if cancel.load(Ordering::SeqCst) {
            info!(rows = accumulated.row_count(), fetches, "stream cancelled");
            return Ok(StreamOutcome::Cancelled {
                rows: accumulated.row_count(),
                fetches,
            });
        }

        let chunk = fetch_frame(executor, &request.with_query(paginate(&request.query, offset, chunk_size)))?;
        fetches += 1;
        let chunk_rows = chunk.row_count();
        debug!(offset, chunk_rows, "stream chunk received");

        if chunk_rows == 0 {
            on_update(&accumulated, true);
            return Ok(StreamOutcome::Completed {
                rows: accumulated.row_count(),
                fetches,
            });
        }

        accumulated.append(chunk)?;
        let complete = chunk_rows < chunk_size;
        on_update(&accumulated, complete);
        if complete {
            return Ok(StreamOutcome::Completed {
                rows: accumulated.row_count(),
                fetches,
            });
        }

        offset += chunk_size;
        if !config.pause.is_zero() && !cancel.load(Ordering::SeqCst) {
            std::thread::sleep(config.pause);
        }
    }
}

/// A streaming worker thread plus its cancellation flag. Dropping the
/// handle cancels the stream.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Spawn `body` on a named thread, passing it the cancellation flag.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, CarboncatError>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(&flag))
            .map_err(|source| CarboncatError::Spawn { task: "stream", source })?;
        Ok(Self {
            cancel,
            thread: Some(thread),
        })
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Cancel and wait for the worker to exit.
    pub fn join(mut self) {
        self.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::time::TimeRange;
    use crate::retrieval::{WireColumn, WireResponse, WireType};
    use chrono::Utc;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Serves `sizes[i]` rows for the i-th call.
    struct Chunks {
        sizes: Vec<usize>,
        calls: Mutex<Vec<String>>,
    }

    impl QueryExecutor for Chunks {
        fn execute(&self, request: &QueryRequest) -> Result<WireResponse, QueryError> {
            let mut calls = self.calls.lock();
            let n = self.sizes.get(calls.len()).copied().unwrap_or(0);
            calls.push(request.query.clone());
            Ok(WireResponse {
                columns: vec![WireColumn {
                    name: "body".into(),
                    kind: WireType::String,
                    values: (0..n).map(|i| json!(format!("line {i}"))).collect(),
                }],
                errors: vec![],
            })
        }
    }

    fn request() -> QueryRequest {
        let now = Utc::now();
        QueryRequest::new("SELECT * FROM t\nLIMIT 20000", TimeRange::new(now, now), "ds")
    }

    fn quick() -> StreamConfig {
        StreamConfig {
            chunk_size: 500,
            pause: Duration::ZERO,
        }
    }

    #[test]
    fn short_chunk_completes_in_same_update() {
        let exec = Chunks { sizes: vec![500, 500, 240], calls: Mutex::new(vec![]) };
        let mut updates = vec![];
        let outcome = run_stream(&exec, &request(), quick(), &AtomicBool::new(false), |f, done| {
            updates.push((f.row_count(), done))
        })
        .unwrap();
        assert_eq!(outcome, StreamOutcome::Completed { rows: 1240, fetches: 3 });
        assert_eq!(updates, vec![(500, false), (1000, false), (1240, true)]);
        let calls = exec.calls.lock();
        assert!(calls[0].ends_with("FROM t LIMIT 0, 500"));
        assert!(calls[2].ends_with("LIMIT 1000, 500"));
    }

    #[test]
    fn exact_multiple_needs_one_empty_fetch() {
        let exec = Chunks { sizes: vec![500, 500], calls: Mutex::new(vec![]) };
        let mut updates = vec![];
        let outcome = run_stream(&exec, &request(), quick(), &AtomicBool::new(false), |f, done| {
            updates.push((f.row_count(), done))
        })
        .unwrap();
        assert_eq!(outcome, StreamOutcome::Completed { rows: 1000, fetches: 3 });
        assert_eq!(updates.last(), Some(&(1000, true)));
    }

    #[test]
    fn cancel_after_second_chunk_stops_fetching() {
        let exec = Chunks { sizes: vec![500, 500, 240], calls: Mutex::new(vec![]) };
        let cancel = AtomicBool::new(false);
        let outcome = run_stream(&exec, &request(), quick(), &cancel, |f, _| {
            if f.row_count() == 1000 {
                cancel.store(true, Ordering::SeqCst);
            }
        })
        .unwrap();
        assert_eq!(outcome, StreamOutcome::Cancelled { rows: 1000, fetches: 2 });
        assert_eq!(exec.calls.lock().len(), 2);
    }

    #[test]
    fn handle_drop_sets_flag() {
        let seen = Arc::new(AtomicBool::new(false));
        let seen_in_thread = Arc::clone(&seen);
        let handle = StreamHandle::spawn("stream-test", move |flag| {
            while !flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            seen_in_thread.store(true, Ordering::SeqCst);
        })
        .unwrap();
        handle.join();
        assert!(seen.load(Ordering::SeqCst));
    }
}
