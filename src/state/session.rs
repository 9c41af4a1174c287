//! The session: reducers, retrieval and persistence in one owner.
//!
//! All state lives on the thread that owns the [`Session`]. Retrieval runs on
//! worker threads that report back through a channel; the owner applies those
//! reports when it calls [`Session::pump`] or [`Session::tick`]. Every
//! retrieval is stamped with a generation number and reports from superseded
//! generations are dropped.
//!
//! After each user-state change the session mirrors the state outward (URL,
//! last-default snapshot, persisted snapshot) and then reconciles: the
//! resolved request key is compared with the last one and a retrieval starts
//! only when it differs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, error, info, warn};

use super::app::{AppAction, AppState};
use super::settings::{SettingsAction, SettingsState, ViewError, validate_view_name};
use super::user::UserAction;
use crate::config::PanelConfig;
use crate::error::CarboncatError;
use crate::model::filter::LABEL_PREFIX;
use crate::model::frame::QueryFrame;
use crate::model::types::{Notification, NotificationKind, RowSelection, UserState, ViewId};
use crate::persist::releases::{self, ReleaseNote};
use crate::persist::storage::{KeyValueStore, StorageKeys, load_json, save_json};
use crate::persist::url::{Location, UrlParams, decode_user_state, encode_user_state};
use crate::query::builder::{LogSchema, generate_histogram_query};
use crate::query::time::TimeRange;
use crate::retrieval::detail::{fetch_detail, trace_url};
use crate::retrieval::{
    AutoRefresh, BatchPlan, BatchSlice, QueryError, QueryExecutor, QueryRequest, RequestKey,
    RetrievalEvent, StreamHandle, fetch_frame, run_batch, run_stream,
};
use crate::search::{CompletionContext, SearchBar, SearchKey};

pub struct Session {
    config: PanelConfig,
    schema: LogSchema,
    executor: Arc<dyn QueryExecutor>,
    store: Arc<dyn KeyValueStore>,
    location: Arc<dyn Location>,
    keys: StorageKeys,

    user: UserState,
    app: AppState,
    settings: SettingsState,
    search: SearchBar,

    last_key: Option<RequestKey>,
    generation: u64,
    detail_generation: u64,
    active_stream: Option<StreamHandle>,
    auto_refresh: AutoRefresh,
    in_flight: usize,
    tx: Sender<RetrievalEvent>,
    rx: Receiver<RetrievalEvent>,
}

impl Session {
    /// Build a session from the current location and durable store.
    ///
    /// URL parameters override individual fields. When persistence is on and
    /// the URL carries no parameters, the stored snapshot seeds the state.
    pub fn new(
        config: PanelConfig,
        executor: Arc<dyn QueryExecutor>,
        store: Arc<dyn KeyValueStore>,
        location: Arc<dyn Location>,
    ) -> Self {
        let keys = config.storage_keys();
        let settings = load_json::<SettingsState>(store.as_ref(), &keys.settings).unwrap_or_else(|| SettingsState {
            max_rows: config.row_limit,
            ..SettingsState::default()
        });

        let params = UrlParams::parse(&location.query());
        let fresh = UserState::default().with_datasource(config.default_data_source());
        let base = if settings.persist_state && params.is_empty() {
            load_json(store.as_ref(), &keys.user_state).unwrap_or(fresh)
        } else {
            fresh
        };
        let user = decode_user_state(&params, base);
        debug!(url_params = params.pairs().len(), "session state loaded");

        let mut app = AppState::default();
        app.absolute_time_range = TimeRange::resolve(&user.time_from, &user.time_to, Utc::now()).ok();

        let (tx, rx) = unbounded();
        Self {
            schema: config.schema(),
            search: SearchBar::new(config.search_debounce()),
            config,
            executor,
            store,
            location,
            keys,
            user,
            app,
            settings,
            last_key: None,
            generation: 0,
            detail_generation: 0,
            active_stream: None,
            auto_refresh: AutoRefresh::new(),
            in_flight: 0,
            tx,
            rx,
        }
    }

    /// Mirror the loaded state outward and run the first retrieval.
    pub fn start(&mut self) {
        self.search.sync_from_state(&self.user.search_term);
        if let Some(row) = self.user.selected_row.clone() {
            self.load_detail(row);
        }
        self.sync_outward();
        self.reconcile();
    }

    // -- Accessors --------------------------------------------------------

    pub fn user(&self) -> &UserState {
        &self.user
    }

    pub fn app(&self) -> &AppState {
        &self.app
    }

    pub fn settings(&self) -> &SettingsState {
        &self.settings
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn search_bar(&self) -> &SearchBar {
        &self.search
    }

    /// Row limit of the batch log query.
    pub fn row_limit(&self) -> usize {
        self.settings.max_rows
    }

    pub fn is_streaming(&self) -> bool {
        self.active_stream.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Worker threads that have not reported back yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    // -- Dispatch ---------------------------------------------------------

    pub fn dispatch(&mut self, action: UserAction) {
        self.dispatch_all(std::iter::once(action));
    }

    /// Apply several actions as one change.
    pub fn dispatch_all(&mut self, actions: impl IntoIterator<Item = UserAction>) {
        let previous = self.user.clone();
        for action in actions {
            self.user.apply(action);
        }
        if self.user != previous {
            self.on_user_changed(&previous);
        }
    }

    pub fn dispatch_app(&mut self, action: AppAction) {
        self.app.apply(action);
    }

    /// Apply a settings change and persist the settings blob.
    pub fn dispatch_settings(&mut self, action: SettingsAction) {
        let was_persisting = self.settings.persist_state;
        self.settings.apply(action);
        if let Err(e) = save_json(self.store.as_ref(), &self.keys.settings, &self.settings) {
            warn!(error = %e, "failed persisting settings");
        }
        if self.settings.persist_state && !was_persisting {
            self.sync_outward();
        }
        self.reconcile();
    }

    fn on_user_changed(&mut self, previous: &UserState) {
        if previous.time_from != self.user.time_from || previous.time_to != self.user.time_to {
            let range = TimeRange::resolve(&self.user.time_from, &self.user.time_to, Utc::now());
            if let Err(e) = &range {
                warn!(error = %e, "unresolvable time window");
            }
            self.app.apply(AppAction::SetAbsoluteTimeRange(range.ok()));
        }
        if previous.selected_row != self.user.selected_row {
            match self.user.selected_row.clone() {
                Some(row) => self.load_detail(row),
                None => {
                    self.detail_generation += 1;
                    self.app.apply(AppAction::SetDetail(None));
                    self.app.apply(AppAction::SetDetailLoading(false));
                }
            }
        }
        if previous.search_term != self.user.search_term {
            self.search.sync_from_state(&self.user.search_term);
        }
        if previous.streaming_mode != self.user.streaming_mode {
            // Switching protocols re-runs retrieval for the same request.
            self.cancel_query();
            self.last_key = None;
        }
        self.sync_outward();
        self.reconcile();
    }

    /// URL, last-default snapshot and (when enabled) the persisted snapshot.
    fn sync_outward(&mut self) {
        let params = encode_user_state(&self.user, None);
        self.location.replace(&params.to_query_string());

        if self.app.current_view.is_default()
            && let Err(e) = save_json(self.store.as_ref(), &self.keys.last_default_state, &self.user)
        {
            warn!(error = %e, "failed persisting last default state");
        }
        if self.settings.persist_state
            && let Err(e) = save_json(self.store.as_ref(), &self.keys.user_state, &self.user)
        {
            warn!(error = %e, "failed persisting user state");
        }
    }

    fn request_key(&self) -> RequestKey {
        RequestKey {
            query: self.schema.resolve(&self.user, self.settings.max_rows),
            data_source: self.user.datasource.clone(),
            time_from: self.user.time_from.clone(),
            time_to: self.user.time_to.clone(),
        }
    }

    /// Start a retrieval when the resolved request changed.
    fn reconcile(&mut self) {
        if self.user.datasource.is_empty() || self.user.time_from.is_empty() || self.user.time_to.is_empty() {
            debug!("no data source or time window, skipping retrieval");
            return;
        }
        let key = self.request_key();
        if self.app.sql_expression != key.query {
            self.app.apply(AppAction::SetSqlExpression(key.query.clone()));
        }
        self.auto_refresh
            .configure(&self.user.refresh_interval, &key.fingerprint(), Instant::now());

        if self.last_key.as_ref() == Some(&key) {
            return;
        }
        self.last_key = Some(key);
        if self.user.streaming_mode {
            self.refresh_streaming();
        } else {
            self.refresh();
        }
    }

    // -- Retrieval --------------------------------------------------------

    fn current_window(&mut self) -> Option<TimeRange> {
        match TimeRange::resolve(&self.user.time_from, &self.user.time_to, Utc::now()) {
            Ok(range) => {
                self.app.apply(AppAction::SetAbsoluteTimeRange(Some(range)));
                Some(range)
            }
            Err(e) => {
                self.app.apply(AppAction::SetError(e.to_string()));
                self.app.apply(AppAction::SetLoading(false));
                None
            }
        }
    }

    fn spawn_worker<F>(&mut self, name: &str, task: &'static str, body: F) -> Result<(), CarboncatError>
    where
        F: FnOnce(&Sender<RetrievalEvent>) + Send + 'static,
    {
        let tx = self.tx.clone();
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                body(&tx);
                let _ = tx.send(RetrievalEvent::Finished);
            })
            .map_err(|source| CarboncatError::Spawn { task, source })?;
        self.in_flight += 1;
        Ok(())
    }

    fn fail_spawn(&mut self, e: CarboncatError) {
        error!(error = %e, "could not start retrieval");
        self.app.apply(AppAction::SetError(e.to_string()));
        self.app.apply(AppAction::SetLoading(false));
    }

    /// Batch retrieval: labels, logs and histogram at once.
    pub fn refresh(&mut self) {
        let query = self.schema.resolve(&self.user, self.settings.max_rows);
        if query.is_empty() {
            debug!("empty query, skipping refresh");
            return;
        }
        if let Some(handle) = self.active_stream.take() {
            handle.cancel();
        }
        self.generation += 1;
        let generation = self.generation;
        self.app.apply(AppAction::SetLoading(true));
        let Some(window) = self.current_window() else {
            return;
        };

        let plan = BatchPlan::new(&self.schema, &query, window, &self.user.datasource);
        let executor = Arc::clone(&self.executor);
        info!(generation, data_source = %self.user.datasource, "batch refresh");
        let spawned = self.spawn_worker("carboncat-batch", "batch", move |tx| {
            let error = run_batch(executor.as_ref(), &plan, |slice, frame| {
                let _ = tx.send(RetrievalEvent::Slice {
                    generation,
                    slice,
                    frame,
                });
            });
            let _ = tx.send(RetrievalEvent::BatchSettled { generation, error });
        });
        if let Err(e) = spawned {
            self.fail_spawn(e);
        }
    }

    /// Chunked retrieval of the log rows, with the histogram fetched once
    /// alongside.
    pub fn refresh_streaming(&mut self) {
        let query = self.schema.resolve(&self.user, self.settings.max_rows);
        if query.is_empty() {
            debug!("empty query, skipping streaming refresh");
            return;
        }
        self.cancel_query();
        self.generation += 1;
        let generation = self.generation;
        self.app.apply(AppAction::SetLoading(true));
        let Some(window) = self.current_window() else {
            return;
        };

        let request = QueryRequest::new(query, window, &self.user.datasource);
        let histogram = request.with_query(generate_histogram_query(&request.query));
        let stream_config = self.config.stream();
        info!(generation, chunk_size = stream_config.chunk_size, "streaming refresh");

        let executor = Arc::clone(&self.executor);
        let tx = self.tx.clone();
        let handle = StreamHandle::spawn("carboncat-stream", move |cancel| {
            let result = run_stream(executor.as_ref(), &request, stream_config, cancel, |frame, complete| {
                let _ = tx.send(RetrievalEvent::StreamUpdate {
                    generation,
                    frame: frame.clone(),
                    complete,
                });
            });
            match result {
                Ok(outcome) => debug!(?outcome, "stream ended"),
                Err(error) => {
                    let _ = tx.send(RetrievalEvent::StreamFailed { generation, error });
                }
            }
            let _ = tx.send(RetrievalEvent::Finished);
        });
        match handle {
            Ok(handle) => {
                self.in_flight += 1;
                self.active_stream = Some(handle);
            }
            Err(e) => {
                self.fail_spawn(e);
                return;
            }
        }

        let executor = Arc::clone(&self.executor);
        let spawned = self.spawn_worker("carboncat-histogram", "histogram", move |tx| {
            let result = fetch_frame(executor.as_ref(), &histogram);
            let _ = tx.send(RetrievalEvent::Histogram { generation, result });
        });
        if let Err(e) = spawned {
            self.fail_spawn(e);
        }
    }

    /// Stop the active stream. A no-op when nothing is streaming.
    pub fn cancel_query(&mut self) {
        let Some(handle) = self.active_stream.take() else {
            return;
        };
        handle.cancel();
        self.generation += 1;
        self.app.apply(AppAction::SetLoading(false));
        info!("streaming query cancelled");
    }

    fn load_detail(&mut self, row: RowSelection) {
        self.detail_generation += 1;
        let generation = self.detail_generation;
        let window = match self.app.absolute_time_range {
            Some(range) => range,
            None => match TimeRange::resolve(&self.user.time_from, &self.user.time_to, Utc::now()) {
                Ok(range) => range,
                Err(e) => {
                    self.app.apply(AppAction::SetError(e.to_string()));
                    return;
                }
            },
        };
        self.app.apply(AppAction::SetDetailLoading(true));
        let executor = Arc::clone(&self.executor);
        let schema = self.schema.clone();
        let data_source = self.user.datasource.clone();
        let spawned = self.spawn_worker("carboncat-detail", "detail", move |tx| {
            let result = fetch_detail(executor.as_ref(), &schema, &row, window, &data_source);
            let _ = tx.send(RetrievalEvent::Detail { generation, result });
        });
        if let Err(e) = spawned {
            error!(error = %e, "could not start detail fetch");
            self.app.apply(AppAction::SetError(e.to_string()));
            self.app.apply(AppAction::SetDetailLoading(false));
        }
    }

    // -- Event handling ---------------------------------------------------

    /// Apply every report that has arrived so far.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    /// Block until every worker has reported back, or `timeout` passes.
    /// Returns `true` when the session went idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(event) => self.apply_event(event),
                Err(_) => return false,
            }
        }
        self.pump();
        true
    }

    fn set_query_error(&mut self, error: &QueryError) {
        warn!(error = %error, "query failed");
        self.app.apply(AppAction::SetError(error.to_string()));
    }

    fn apply_event(&mut self, event: RetrievalEvent) {
        match event {
            RetrievalEvent::Finished => {
                self.in_flight = self.in_flight.saturating_sub(1);
            }
            RetrievalEvent::Detail { generation, result } => {
                if generation != self.detail_generation {
                    return;
                }
                self.app.apply(AppAction::SetDetailLoading(false));
                match result {
                    Ok(detail) => self.app.apply(AppAction::SetDetail(detail)),
                    Err(e) => self.set_query_error(&e),
                }
            }
            RetrievalEvent::Slice { generation, .. }
            | RetrievalEvent::BatchSettled { generation, .. }
            | RetrievalEvent::StreamUpdate { generation, .. }
            | RetrievalEvent::StreamFailed { generation, .. }
            | RetrievalEvent::Histogram { generation, .. }
                if generation != self.generation =>
            {
                debug!(generation, current = self.generation, "dropping stale retrieval event");
            }
            RetrievalEvent::Slice { slice, frame, .. } => match slice {
                BatchSlice::Labels => self.apply_labels(&frame),
                BatchSlice::Logs => self.app.apply(AppAction::SetLogFrame(frame)),
                BatchSlice::Histogram => self.app.apply(AppAction::SetLevelFrame(frame)),
            },
            RetrievalEvent::BatchSettled { error, .. } => {
                if let Some(e) = error {
                    self.set_query_error(&e);
                }
                self.app.apply(AppAction::SetLoading(false));
            }
            RetrievalEvent::StreamUpdate { frame, complete, .. } => {
                self.app.apply(AppAction::SetLogFrame(frame));
                if complete {
                    self.app.apply(AppAction::SetLoading(false));
                    self.active_stream = None;
                }
            }
            RetrievalEvent::StreamFailed { error, .. } => {
                self.set_query_error(&error);
                self.app.apply(AppAction::SetLoading(false));
                self.active_stream = None;
            }
            RetrievalEvent::Histogram { result, .. } => match result {
                Ok(frame) => self.app.apply(AppAction::SetLevelFrame(frame)),
                Err(e) => self.set_query_error(&e),
            },
        }
    }

    /// Prefix discovered keys, merge with the selected labels and sort. An
    /// empty discovery keeps the current labels.
    fn apply_labels(&mut self, frame: &QueryFrame) {
        let Some(column) = frame.columns().first() else {
            return;
        };
        let discovered: Vec<String> = (0..column.values.len())
            .filter_map(|row| column.values.text_at(row))
            .filter(|key| !key.is_empty())
            .map(|key| format!("{LABEL_PREFIX}{key}"))
            .collect();
        if discovered.is_empty() {
            return;
        }
        let mut labels = discovered;
        labels.extend(self.user.selected_labels.iter().cloned());
        labels.sort();
        labels.dedup();
        self.app.apply(AppAction::SetLabels(labels));
    }

    // -- Timers -----------------------------------------------------------

    /// Advance timers: apply reports, propagate a settled search term, run a
    /// due auto-refresh and expire the notification.
    pub fn tick(&mut self, now: Instant) {
        self.pump();
        if let Some(action) = self.search.tick(now) {
            self.dispatch(action);
        }
        if self.auto_refresh.poll(now) {
            debug!("auto-refresh due");
            self.refresh();
        }
        let ttl = self.config.notification_ttl();
        let expired = self
            .app
            .notification
            .as_ref()
            .is_some_and(|n| now.saturating_duration_since(n.raised_at) >= ttl);
        if expired {
            self.app.apply(AppAction::ClearNotification);
        }
    }

    // -- Search bar -------------------------------------------------------

    pub fn completion_context(&self) -> CompletionContext {
        CompletionContext::from_frame(&self.app.log_frame, &self.app.labels)
    }

    pub fn search_input(&mut self, text: &str, now: Instant) {
        let ctx = self.completion_context();
        let actions = self.search.on_change(text, &ctx, now);
        self.dispatch_all(actions);
    }

    pub fn search_key(&mut self, key: SearchKey, now: Instant) {
        let ctx = self.completion_context();
        let actions = self.search.on_key(key, &self.user.filters, &ctx, now);
        self.dispatch_all(actions);
    }

    pub fn search_select(&mut self, idx: usize, now: Instant) {
        let ctx = self.completion_context();
        let actions = self.search.select_suggestion(idx, &ctx, now);
        self.dispatch_all(actions);
    }

    pub fn search_only(&mut self, idx: usize, now: Instant) {
        if let Some(action) = self.search.only_suggestion(idx, now) {
            self.dispatch(action);
        }
    }

    // -- Rows -------------------------------------------------------------

    /// Open the detail view for row `idx` of the loaded rows.
    pub fn select_row(&mut self, idx: usize) -> bool {
        if idx >= self.app.log_frame.row_count() {
            return false;
        }
        let selection = RowSelection::from_frame(&self.app.log_frame, idx);
        self.dispatch(UserAction::SetLogDetails(selection));
        true
    }

    /// Trace viewer link for the open detail, when configured.
    pub fn trace_link(&self) -> Option<String> {
        let template = self.config.trace_url.as_deref()?;
        let id = self.app.detail.as_ref()?.trace_id()?;
        Some(trace_url(template, id))
    }

    pub fn notify_message_copied(&mut self) {
        self.notify(NotificationKind::Copied, "Message has been copied to your clipboard");
    }

    fn notify(&mut self, kind: NotificationKind, message: impl Into<String>) {
        self.app.apply(AppAction::SetNotification(Notification::new(kind, message)));
    }

    // -- SQL mode ---------------------------------------------------------

    /// Entering SQL mode seeds the editor with the resolved query; leaving it
    /// drops the SQL text.
    pub fn toggle_sql_mode(&mut self, on: bool) {
        if on {
            let seed = self.app.sql_expression.clone();
            self.dispatch_all([UserAction::SetSql(seed), UserAction::SqlMode(true)]);
            self.app.apply(AppAction::OpenSqlEditor);
        } else {
            self.dispatch_all([UserAction::ClearSql, UserAction::SqlMode(false)]);
            self.app.apply(AppAction::CloseSqlEditor);
        }
    }

    // -- Views ------------------------------------------------------------

    pub fn select_view(&mut self, view: ViewId) -> Result<(), ViewError> {
        match &view {
            ViewId::Default => {
                self.app.apply(AppAction::SetCurrentView(ViewId::Default));
                if let Some(state) = load_json::<UserState>(self.store.as_ref(), &self.keys.last_default_state) {
                    self.dispatch(UserAction::SetState(Box::new(state)));
                }
            }
            ViewId::Named(name) => {
                let state = self.settings.view(name)?.clone();
                self.app.apply(AppAction::SetCurrentView(view.clone()));
                self.dispatch(UserAction::SetState(Box::new(state)));
            }
        }
        info!(view = %view, "view selected");
        Ok(())
    }

    /// Save the current state under `name` and make it the current view.
    pub fn save_view(&mut self, name: &str) -> Result<(), ViewError> {
        let name = validate_view_name(name)?;
        self.dispatch_settings(SettingsAction::SaveView {
            name: name.clone(),
            state: Box::new(self.user.clone()),
        });
        self.app.apply(AppAction::SetCurrentView(ViewId::Named(name.clone())));
        self.app.apply(AppAction::CloseSaveView);
        self.notify(NotificationKind::Saved, format!("Current view has been saved as {name}!"));
        Ok(())
    }

    /// Delete the current named view and fall back to the default view.
    /// Returns `false` when the default view is current.
    pub fn delete_current_view(&mut self) -> bool {
        let ViewId::Named(name) = self.app.current_view.clone() else {
            return false;
        };
        self.dispatch_settings(SettingsAction::DeleteView(name.clone()));
        if let Err(e) = self.select_view(ViewId::Default) {
            warn!(error = %e, "failed returning to default view");
        }
        self.notify(NotificationKind::Deleted, format!("Deleted view {name}"));
        true
    }

    // -- Sharing ----------------------------------------------------------

    /// URL parameters with the window resolved to absolute timestamps.
    pub fn share_params(&self) -> UrlParams {
        let absolute = TimeRange::resolve(&self.user.time_from, &self.user.time_to, Utc::now()).ok();
        encode_user_state(&self.user, absolute.as_ref())
    }

    pub fn share_link(&mut self, base: &str) -> String {
        let link = format!("{base}?{}", self.share_params().to_query_string());
        self.notify(NotificationKind::Copied, "URL has been copied to your clipboard");
        link
    }

    // -- Release notes ----------------------------------------------------

    pub fn unseen_releases(&self) -> Vec<&'static ReleaseNote> {
        releases::unseen_in(self.store.as_ref(), &self.keys.last_seen_version)
    }

    pub fn mark_releases_seen(&self, shown: &[&ReleaseNote]) {
        if let Err(e) = releases::mark_seen(self.store.as_ref(), &self.keys.last_seen_version, shown) {
            warn!(error = %e, "failed storing last-seen version");
        }
    }
}
