//! Search bar state machine.
//!
//! The bar owns the local text buffer and turns edits and key presses into
//! [`UserAction`]s. The free-text part of the buffer reaches the user state
//! only after it has been stable for the debounce delay; while an edit is
//! pending, the user state's search term is not echoed back into the
//! buffer.

use std::time::{Duration, Instant};

use tracing::trace;

use super::parser::{
    CompletionContext, complete_token, extract_tokens, free_text, in_progress_range,
    suggestion_filter, suggestions_for,
};
use crate::model::filter::Filter;
use crate::state::user::UserAction;

/// Delay between the last edit and propagation of the search term.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Keys the bar reacts to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SearchKey {
    Backspace,
    Tab,
    ShiftTab,
    Enter,
    Other,
}

#[derive(Debug, Clone)]
pub struct SearchBar {
    buffer: String,
    suggestions: Vec<String>,
    selected: usize,
    pending_delete: Option<usize>,
    dirty_since: Option<Instant>,
    debounce: Duration,
}

impl Default for SearchBar {
    fn default() -> Self {
        Self::new(SEARCH_DEBOUNCE)
    }
}

impl SearchBar {
    pub fn new(debounce: Duration) -> Self {
        Self {
            buffer: String::new(),
            suggestions: Vec::new(),
            selected: 0,
            pending_delete: None,
            dirty_since: None,
            debounce,
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Index of the filter chip marked for deletion.
    pub fn pending_delete(&self) -> Option<usize> {
        self.pending_delete
    }

    /// True while an edit has not yet been propagated.
    pub fn is_debouncing(&self) -> bool {
        self.dirty_since.is_some()
    }

    /// The operator changed the text to `text`.
    pub fn on_change(&mut self, text: &str, ctx: &CompletionContext, now: Instant) -> Vec<UserAction> {
        let parsed = extract_tokens(text);
        let actions: Vec<UserAction> = parsed.filters.into_iter().map(UserAction::FilterAdd).collect();
        if !actions.is_empty() {
            trace!(count = actions.len(), "extracted filter tokens");
        }

        self.suggestions = suggestions_for(&parsed.remainder, ctx);
        self.selected = 0;
        self.buffer = parsed.remainder;
        self.dirty_since = Some(now);
        actions
    }

    /// A key was pressed. `filters` is the current filter list, used by
    /// backspace-to-delete on an empty buffer.
    pub fn on_key(
        &mut self,
        key: SearchKey,
        filters: &[Filter],
        ctx: &CompletionContext,
        now: Instant,
    ) -> Vec<UserAction> {
        if key == SearchKey::Backspace && self.buffer.is_empty() {
            return match self.pending_delete.take() {
                Some(idx) => filters
                    .get(idx)
                    .cloned()
                    .map(UserAction::FilterRemove)
                    .into_iter()
                    .collect(),
                None => {
                    self.pending_delete = filters.len().checked_sub(1);
                    Vec::new()
                }
            };
        }

        self.pending_delete = None;
        match key {
            SearchKey::Tab => {
                if self.selected + 1 < self.suggestions.len() {
                    self.selected += 1;
                }
                Vec::new()
            }
            SearchKey::ShiftTab => {
                self.selected = self.selected.saturating_sub(1);
                Vec::new()
            }
            SearchKey::Enter => self.accept(ctx, now),
            SearchKey::Backspace | SearchKey::Other => Vec::new(),
        }
    }

    /// Choose suggestion `idx` (e.g. by click) and accept it.
    pub fn select_suggestion(&mut self, idx: usize, ctx: &CompletionContext, now: Instant) -> Vec<UserAction> {
        if idx < self.suggestions.len() {
            self.selected = idx;
        }
        self.accept(ctx, now)
    }

    /// Replace every filter with suggestion `idx` and drop the in-progress
    /// token. Key-only suggestions have no predicate and are ignored.
    pub fn only_suggestion(&mut self, idx: usize, now: Instant) -> Option<UserAction> {
        let filter = suggestion_filter(self.suggestions.get(idx)?)?;
        if let Some(range) = in_progress_range(&self.buffer) {
            self.buffer.replace_range(range, "");
            self.buffer = self.buffer.trim().to_string();
        }
        self.suggestions.clear();
        self.selected = 0;
        self.dirty_since = Some(now);
        Some(UserAction::FilterOnly(filter))
    }

    /// Rewrite the in-progress token to the selected suggestion. A rewrite
    /// that changes nothing means the token is already complete, so it is
    /// closed and parsed.
    fn accept(&mut self, ctx: &CompletionContext, now: Instant) -> Vec<UserAction> {
        let Some(choice) = self.suggestions.get(self.selected) else {
            return Vec::new();
        };
        let Some(rewritten) = complete_token(&self.buffer, choice) else {
            return Vec::new();
        };
        if rewritten == self.buffer {
            self.on_change(&format!("{rewritten}#"), ctx, now)
        } else {
            self.buffer = rewritten;
            self.dirty_since = Some(now);
            Vec::new()
        }
    }

    /// Advance the debounce timer; yields the search-term update once the
    /// buffer has been stable long enough.
    pub fn tick(&mut self, now: Instant) -> Option<UserAction> {
        let since = self.dirty_since?;
        if now.saturating_duration_since(since) < self.debounce {
            return None;
        }
        self.dirty_since = None;
        Some(UserAction::SetSearchTerm(free_text(&self.buffer)))
    }

    /// Reflect an externally changed search term into the buffer. Ignored
    /// while a local edit is pending or when it already matches.
    pub fn sync_from_state(&mut self, term: &str) {
        if self.is_debouncing() || free_text(&self.buffer) == term {
            return;
        }
        self.buffer = term.to_string();
        self.suggestions.clear();
        self.selected = 0;
    }
}
