//! Settings reducer. The whole settings blob is persisted on every change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::types::UserState;
use crate::query::builder::DEFAULT_ROW_LIMIT;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    #[error("view name cannot be empty")]
    EmptyName,

    #[error("no saved view named '{0}'")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsState {
    pub table_line_height: u32,
    pub sidebar_open: bool,
    /// Persist the user state across reloads.
    #[serde(rename = "saveState")]
    pub persist_state: bool,
    pub saved_views: BTreeMap<String, UserState>,
    /// Row limit of the batch log query.
    #[serde(rename = "maxNumberOfLines")]
    pub max_rows: usize,
}

impl Default for SettingsState {
    fn default() -> Self {
        Self {
            table_line_height: 35,
            sidebar_open: true,
            persist_state: true,
            saved_views: BTreeMap::new(),
            max_rows: DEFAULT_ROW_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsAction {
    SetTableLineHeight(u32),
    SaveView { name: String, state: Box<UserState> },
    DeleteView(String),
    TogglePersistState,
    ToggleSidebar,
    SetMaxRows(usize),
}

impl SettingsState {
    pub fn apply(&mut self, action: SettingsAction) {
        match action {
            SettingsAction::SetTableLineHeight(h) => self.table_line_height = h,
            SettingsAction::SaveView { name, state } => {
                self.saved_views.insert(name, *state);
            }
            SettingsAction::DeleteView(name) => {
                self.saved_views.remove(&name);
            }
            SettingsAction::TogglePersistState => self.persist_state = !self.persist_state,
            SettingsAction::ToggleSidebar => self.sidebar_open = !self.sidebar_open,
            SettingsAction::SetMaxRows(n) => self.max_rows = n,
        }
    }

    pub fn view(&self, name: &str) -> Result<&UserState, ViewError> {
        self.saved_views
            .get(name)
            .ok_or_else(|| ViewError::Unknown(name.to_string()))
    }

    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.saved_views.keys().map(String::as_str)
    }
}

/// Trimmed view name, rejecting blanks.
pub fn validate_view_name(name: &str) -> Result<String, ViewError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ViewError::EmptyName);
    }
    Ok(name.to_string())
}
