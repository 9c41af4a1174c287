//! User-state reducer.

use crate::model::filter::{self, Filter};
use crate::model::types::{LogLevel, Mode, RowSelection, UserState};

/// Every way the user state can change.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    // -- Query text -------------------------------------------------------
    /// Debounced free-text search term.
    SetSearchTerm(String),
    /// Raw SQL override text.
    SetSql(String),
    /// Drop the raw SQL override.
    ClearSql,
    /// Enter (`true`) or leave (`false`) SQL mode.
    SqlMode(bool),

    // -- Filters ----------------------------------------------------------
    /// Toggle a filter into the list.
    FilterAdd(Filter),
    /// Remove the first equal filter.
    FilterRemove(Filter),
    /// Replace all filters with this one.
    FilterOnly(Filter),

    // -- Window / source --------------------------------------------------
    SetTimeRange { from: String, to: String },
    SetDataSource(String),
    SetLogLevels(Vec<LogLevel>),
    SetRefreshInterval(String),
    SetStreamingMode(bool),

    // -- Display ----------------------------------------------------------
    /// Open the detail view for a row.
    SetLogDetails(RowSelection),
    CloseLogDetails,
    /// Add or remove a label column.
    ToggleLabel(String),
    /// Add or remove a fixed field column.
    ToggleField(String),

    /// Replace the whole state (view switching).
    SetState(Box<UserState>),
}

fn toggle(list: &mut Vec<String>, item: String) {
    match list.iter().position(|x| *x == item) {
        Some(pos) => {
            list.remove(pos);
        }
        None => list.push(item),
    }
}

impl UserState {
    /// Apply one action in place.
    pub fn apply(&mut self, action: UserAction) {
        match action {
            UserAction::SetSearchTerm(term) => self.search_term = term,
            UserAction::SetSql(sql) => self.sql_expression = Some(sql),
            UserAction::ClearSql => self.sql_expression = None,
            UserAction::SqlMode(on) => self.mode = if on { Mode::Sql } else { Mode::Normal },
            UserAction::FilterAdd(f) => self.filters = filter::add(&self.filters, &f),
            UserAction::FilterRemove(f) => self.filters = filter::remove(&self.filters, &f),
            UserAction::FilterOnly(f) => self.filters = filter::only(&self.filters, &f),
            UserAction::SetTimeRange { from, to } => {
                self.time_from = from;
                self.time_to = to;
            }
            UserAction::SetDataSource(ds) => self.datasource = ds,
            UserAction::SetLogLevels(levels) => self.log_levels = levels,
            UserAction::SetRefreshInterval(code) => self.refresh_interval = code,
            UserAction::SetStreamingMode(on) => self.streaming_mode = on,
            UserAction::SetLogDetails(row) => self.selected_row = Some(row),
            UserAction::CloseLogDetails => self.selected_row = None,
            UserAction::ToggleLabel(label) => toggle(&mut self.selected_labels, label),
            UserAction::ToggleField(field) => toggle(&mut self.selected_fields, field),
            UserAction::SetState(state) => *self = *state,
        }
    }

    /// Apply an action to a copy.
    pub fn reduce(&self, action: UserAction) -> UserState {
        let mut next = self.clone();
        next.apply(action);
        next
    }
}
