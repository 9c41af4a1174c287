use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use carboncat::retrieval::{WireColumn, WireError, WireResponse, WireType};
use carboncat::{QueryError, QueryExecutor, QueryRequest};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{Value, json};

static PAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"LIMIT (\d+), (\d+)$").expect("page regex"));

/// What a query asked for, judged by its text.
#[allow(dead_code)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Labels,
    Logs,
    Page,
    Histogram,
    Detail,
}

impl QueryKind {
    pub fn of(query: &str) -> Self {
        if query.contains("mapKeys") {
            Self::Labels
        } else if query.contains("countIf") {
            Self::Histogram
        } else if query.contains("parseDateTime64BestEffort") {
            Self::Detail
        } else if PAGE.is_match(query) {
            Self::Page
        } else {
            Self::Logs
        }
    }
}

/// Executor answering from a script: a fixed batch size, a queue of page
/// sizes for streaming, and optional per-kind failures.
#[allow(dead_code)]
pub struct ScriptedExecutor {
    batch_rows: usize,
    pages: Mutex<VecDeque<usize>>,
    page_delay: Duration,
    failures: HashMap<QueryKind, String>,
    pub log: Mutex<Vec<(QueryKind, String)>>,
}

#[allow(dead_code)]
impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            batch_rows: 3,
            pages: Mutex::new(VecDeque::new()),
            page_delay: Duration::ZERO,
            failures: HashMap::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_batch_rows(mut self, rows: usize) -> Self {
        self.batch_rows = rows;
        self
    }

    pub fn with_pages(self, pages: impl IntoIterator<Item = usize>) -> Self {
        *self.pages.lock() = pages.into_iter().collect();
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn failing(mut self, kind: QueryKind, message: &str) -> Self {
        self.failures.insert(kind, message.to_string());
        self
    }

    pub fn count(&self, kind: QueryKind) -> usize {
        self.log.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn total(&self) -> usize {
        self.log.lock().len()
    }

    pub fn queries(&self, kind: QueryKind) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, q)| q.clone())
            .collect()
    }
}

impl QueryExecutor for ScriptedExecutor {
    fn execute(&self, request: &QueryRequest) -> Result<WireResponse, QueryError> {
        let kind = QueryKind::of(&request.query);
        self.log.lock().push((kind, request.query.clone()));
        if let Some(message) = self.failures.get(&kind) {
            return Ok(WireResponse {
                columns: vec![],
                errors: vec![WireError {
                    message: message.clone(),
                }],
            });
        }
        Ok(match kind {
            QueryKind::Labels => label_keys(&["region", "app"]),
            QueryKind::Logs => log_rows(0, self.batch_rows),
            QueryKind::Page => {
                if !self.page_delay.is_zero() {
                    std::thread::sleep(self.page_delay);
                }
                let offset = PAGE
                    .captures(&request.query)
                    .and_then(|c| c[1].parse().ok())
                    .unwrap_or(0);
                let rows = self.pages.lock().pop_front().unwrap_or(0);
                log_rows(offset, rows)
            }
            QueryKind::Histogram => histogram(),
            QueryKind::Detail => log_rows(0, 1),
        })
    }
}

fn column(name: &str, kind: WireType, values: Vec<Value>) -> WireColumn {
    WireColumn {
        name: name.to_string(),
        kind,
        values,
    }
}

#[allow(dead_code)]
pub fn label_keys(keys: &[&str]) -> WireResponse {
    WireResponse {
        columns: vec![column(
            "key",
            WireType::String,
            keys.iter().map(|k| json!(k)).collect(),
        )],
        errors: vec![],
    }
}

/// `rows` log rows numbered from `start`. An empty page has no columns.
pub fn log_rows(start: usize, rows: usize) -> WireResponse {
    if rows == 0 {
        return WireResponse::default();
    }
    let levels = ["DEBUG", "INFO", "WARN", "ERROR", "FATAL"];
    let idx: Vec<usize> = (start..start + rows).collect();
    WireResponse {
        columns: vec![
            column(
                "timestamp",
                WireType::Time,
                idx.iter().map(|i| json!(1_700_000_000_000i64 - (*i as i64) * 1000)).collect(),
            ),
            column("body", WireType::String, idx.iter().map(|i| json!(format!("message {i}"))).collect()),
            column("level", WireType::String, idx.iter().map(|i| json!(levels[i % 5])).collect()),
            column(
                "labels",
                WireType::Other,
                idx.iter().map(|_| json!({"app": "api", "team": "core"})).collect(),
            ),
            column("app", WireType::String, idx.iter().map(|_| json!("api")).collect()),
            column("service", WireType::String, idx.iter().map(|_| json!("web")).collect()),
            column("traceID", WireType::String, idx.iter().map(|i| json!(format!("trace-{i}"))).collect()),
            column("spanID", WireType::String, idx.iter().map(|i| json!(format!("span-{i}"))).collect()),
        ],
        errors: vec![],
    }
}

fn histogram() -> WireResponse {
    let mut columns = vec![column("time", WireType::Time, vec![json!(1_700_000_000_000i64)])];
    for level in ["DEBUG", "INFO", "WARN", "ERROR", "FATAL"] {
        columns.push(column(level, WireType::Number, vec![json!(1)]));
    }
    WireResponse {
        columns,
        errors: vec![],
    }
}

#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }

    pub fn unset(key: &str) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::remove_var(key) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}
