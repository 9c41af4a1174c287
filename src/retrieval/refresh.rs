use std::time::{Duration, Instant};

use tracing::debug;

use crate::query::interval::parse_refresh_interval;

/// Auto-refresh timer.
///
/// The timer is keyed on the refresh code plus the identity of the current
/// request; any change to either restarts it from `now`.
#[derive(Debug, Clone, Default)]
pub struct AutoRefresh {
    interval: Option<Duration>,
    key: Option<String>,
    next_due: Option<Instant>,
}

impl AutoRefresh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// (Re)arm for `code` and `request_key`. A no-op when neither changed.
    pub fn configure(&mut self, code: &str, request_key: &str, now: Instant) {
        let interval = parse_refresh_interval(code);
        if interval == self.interval && self.key.as_deref() == Some(request_key) {
            return;
        }
        debug!(code, ?interval, "auto-refresh reset");
        self.interval = interval;
        self.key = Some(request_key.to_string());
        self.next_due = interval.map(|i| now + i);
    }

    /// True when a refresh is due; the next deadline is then scheduled one
    /// interval after `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        match (self.interval, self.next_due) {
            (Some(interval), Some(due)) if now >= due => {
                self.next_due = Some(now + interval);
                true
            }
            _ => false,
        }
    }
}
