//! Application-state reducer: derived and volatile data, never persisted.

use crate::model::frame::QueryFrame;
use crate::model::types::{Notification, ViewId};
use crate::query::time::TimeRange;
use crate::retrieval::LogDetail;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    /// The resolved query for the current user state.
    pub sql_expression: String,
    pub is_loading: bool,
    pub detail_loading: bool,
    pub log_frame: QueryFrame,
    pub level_frame: QueryFrame,
    /// Discovered and selected label keys, sorted.
    pub labels: Vec<String>,
    pub detail: Option<LogDetail>,
    pub error: Option<String>,
    pub settings_open: bool,
    pub save_view_open: bool,
    pub sql_editor_open: bool,
    pub absolute_time_range: Option<TimeRange>,
    pub notification: Option<Notification>,
    pub current_view: ViewId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    SetSqlExpression(String),
    SetLogFrame(QueryFrame),
    SetLevelFrame(QueryFrame),
    SetLabels(Vec<String>),
    SetDetail(Option<LogDetail>),
    SetLoading(bool),
    SetDetailLoading(bool),
    SetError(String),
    /// Operator dismissed the error banner.
    ClearError,
    SetNotification(Notification),
    ClearNotification,
    SetCurrentView(ViewId),
    OpenSettings,
    CloseSettings,
    OpenSaveView,
    CloseSaveView,
    OpenSqlEditor,
    CloseSqlEditor,
    SetAbsoluteTimeRange(Option<TimeRange>),
}

impl AppState {
    pub fn apply(&mut self, action: AppAction) {
        match action {
            AppAction::SetSqlExpression(sql) => self.sql_expression = sql,
            AppAction::SetLogFrame(frame) => self.log_frame = frame,
            AppAction::SetLevelFrame(frame) => self.level_frame = frame,
            AppAction::SetLabels(labels) => self.labels = labels,
            AppAction::SetDetail(detail) => self.detail = detail,
            AppAction::SetLoading(on) => self.is_loading = on,
            AppAction::SetDetailLoading(on) => self.detail_loading = on,
            AppAction::SetError(message) => self.error = Some(message),
            AppAction::ClearError => self.error = None,
            AppAction::SetNotification(n) => self.notification = Some(n),
            AppAction::ClearNotification => self.notification = None,
            AppAction::SetCurrentView(view) => self.current_view = view,
            AppAction::OpenSettings => self.settings_open = true,
            AppAction::CloseSettings => self.settings_open = false,
            AppAction::OpenSaveView => self.save_view_open = true,
            AppAction::CloseSaveView => self.save_view_open = false,
            AppAction::OpenSqlEditor => self.sql_editor_open = true,
            AppAction::CloseSqlEditor => self.sql_editor_open = false,
            AppAction::SetAbsoluteTimeRange(range) => self.absolute_time_range = range,
        }
    }
}
