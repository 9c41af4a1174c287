//! URL query-parameter mirror of the user state.
//!
//! Scalars are written as plain strings; composite fields (filters, levels,
//! fields, labels) as Base64-encoded JSON, and the SQL text as Base64. The
//! selected row is plain JSON. Decoding never fails as a whole: a
//! malformed parameter keeps the field's current value and is logged.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use url::form_urlencoded;

use crate::model::filter::Filter;
use crate::model::types::{Mode, UserState};
use crate::query::time::TimeRange;

/// Ordered query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParams {
    pairs: Vec<(String, String)>,
}

impl UrlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string, with or without the leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            pairs: form_urlencoded::parse(query.as_bytes()).into_owned().collect(),
        }
    }

    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }

    /// First non-empty value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((name.to_string(), value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// The host's address bar.
pub trait Location: Send + Sync {
    /// Current query string.
    fn query(&self) -> String;
    /// Replace the query string in place, without a history entry.
    fn replace(&self, query: &str);
}

/// In-process [`Location`].
#[derive(Debug, Default)]
pub struct MemoryLocation {
    query: Mutex<String>,
    replacements: Mutex<usize>,
}

impl MemoryLocation {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Mutex::new(query.into()),
            replacements: Mutex::new(0),
        }
    }

    /// How many times the query string has been replaced.
    pub fn replacements(&self) -> usize {
        *self.replacements.lock()
    }
}

impl Location for MemoryLocation {
    fn query(&self) -> String {
        self.query.lock().clone()
    }

    fn replace(&self, query: &str) {
        *self.query.lock() = query.to_string();
        *self.replacements.lock() += 1;
    }
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    match serde_json::to_vec(value) {
        Ok(bytes) => Some(BASE64.encode(bytes)),
        Err(e) => {
            warn!(error = %e, "failed encoding URL parameter");
            None
        }
    }
}

/// URL parameters for `state`. With `absolute`, the window is written as
/// resolved ISO timestamps (share links) instead of the raw expressions.
pub fn encode_user_state(state: &UserState, absolute: Option<&TimeRange>) -> UrlParams {
    let mut params = UrlParams::new();
    if !state.search_term.is_empty() {
        params.set("search", &state.search_term);
    }
    if let Some(sql) = state.sql_expression.as_deref().filter(|s| !s.is_empty()) {
        params.set("sql", BASE64.encode(sql));
    }
    params.set("mode", state.mode.as_str());
    if !state.filters.is_empty()
        && let Some(v) = encode_json(&state.filters)
    {
        params.set("filters", v);
    }
    match absolute {
        Some(range) => {
            let (from, to) = range.to_iso();
            params.set("from", from);
            params.set("to", to);
        }
        None => {
            params.set("from", &state.time_from);
            params.set("to", &state.time_to);
        }
    }
    if !state.datasource.is_empty() {
        params.set("ds", &state.datasource);
    }
    if !state.log_levels.is_empty()
        && let Some(v) = encode_json(&state.log_levels)
    {
        params.set("logLevels", v);
    }
    if !state.refresh_interval.is_empty() {
        params.set("refresh", &state.refresh_interval);
    }
    if let Some(row) = &state.selected_row {
        match serde_json::to_string(row) {
            Ok(v) => params.set("selectedRow", v),
            Err(e) => warn!(error = %e, "failed encoding selected row"),
        }
    }
    if !state.selected_fields.is_empty()
        && let Some(v) = encode_json(&state.selected_fields)
    {
        params.set("fields", v);
    }
    if !state.selected_labels.is_empty()
        && let Some(v) = encode_json(&state.selected_labels)
    {
        params.set("labels", v);
    }
    params
}

fn decode_base64(name: &str, raw: &str) -> Option<Vec<u8>> {
    match BASE64.decode(raw) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(param = name, error = %e, "ignoring malformed base64 URL parameter");
            None
        }
    }
}

fn decode_json<T: DeserializeOwned>(name: &str, bytes: &[u8]) -> Option<T> {
    match serde_json::from_slice(bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(param = name, error = %e, "ignoring malformed JSON URL parameter");
            None
        }
    }
}

fn decode_b64_json<T: DeserializeOwned>(params: &UrlParams, name: &str) -> Option<T> {
    let raw = params.get(name)?;
    decode_json(name, &decode_base64(name, raw)?)
}

/// Overlay URL parameters onto `base`. Each present parameter overrides its
/// field; `from`/`to` apply only as a pair. The `app` and `team` flags each
/// append one label equality filter after everything else.
pub fn decode_user_state(params: &UrlParams, base: UserState) -> UserState {
    let mut state = base;

    if let Some(search) = params.get("search") {
        state.search_term = search.to_string();
    }
    if let Some(raw) = params.get("sql")
        && let Some(bytes) = decode_base64("sql", raw)
    {
        match String::from_utf8(bytes) {
            Ok(sql) => state.sql_expression = Some(sql),
            Err(e) => warn!(error = %e, "ignoring non-UTF-8 sql URL parameter"),
        }
    }
    if let Some(raw) = params.get("mode") {
        match Mode::parse(raw) {
            Some(mode) => state.mode = mode,
            None => warn!(mode = raw, "ignoring unknown mode URL parameter"),
        }
    }
    if let Some(filters) = decode_b64_json(params, "filters") {
        state.filters = filters;
    }
    if let (Some(from), Some(to)) = (params.get("from"), params.get("to")) {
        state.time_from = from.to_string();
        state.time_to = to.to_string();
    }
    if let Some(ds) = params.get("ds") {
        state.datasource = ds.to_string();
    }
    if let Some(levels) = decode_b64_json(params, "logLevels") {
        state.log_levels = levels;
    }
    if let Some(refresh) = params.get("refresh") {
        state.refresh_interval = refresh.to_string();
    }
    if let Some(raw) = params.get("selectedRow")
        && let Some(row) = decode_json("selectedRow", raw.as_bytes())
    {
        state.selected_row = Some(row);
    }
    if let Some(fields) = decode_b64_json(params, "fields") {
        state.selected_fields = fields;
    }
    if let Some(labels) = decode_b64_json(params, "labels") {
        state.selected_labels = labels;
    }

    for (flag, key) in [("app", "labels.app"), ("team", "labels.team")] {
        if let Some(value) = params.get(flag) {
            state.filters.push(Filter::eq(key, value));
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{LogLevel, RowSelection};

    #[test]
    fn filters_survive_a_url_roundtrip() {
        let mut state = UserState::default();
        state.filters = vec![Filter::eq("level", "ERROR")];
        let query = encode_user_state(&state, None).to_query_string();
        let decoded = decode_user_state(&UrlParams::parse(&query), UserState::default());
        assert_eq!(decoded.filters, state.filters);
    }

    #[test]
    fn composite_fields_are_base64_json() {
        let mut state = UserState::default();
        state.sql_expression = Some("SELECT 1".into());
        let params = encode_user_state(&state, None);
        assert_eq!(params.get("sql"), Some(BASE64.encode("SELECT 1").as_str()));
        let levels = BASE64.decode(params.get("logLevels").unwrap()).unwrap();
        assert_eq!(
            String::from_utf8(levels).unwrap(),
            r#"["DEBUG","INFO","WARN","ERROR","FATAL"]"#
        );
        assert_eq!(params.get("mode"), Some("normal"));
        assert_eq!(params.get("from"), Some("now-5m"));
        assert!(params.get("search").is_none());
    }

    #[test]
    fn from_and_to_apply_only_together() {
        let decoded = decode_user_state(&UrlParams::parse("from=now-1h"), UserState::default());
        assert_eq!(decoded.time_from, "now-5m");
        let decoded = decode_user_state(&UrlParams::parse("?from=now-1h&to=now-5m"), UserState::default());
        assert_eq!(decoded.time_from, "now-1h");
        assert_eq!(decoded.time_to, "now-5m");
    }

    #[test]
    fn malformed_fields_fall_back() {
        let base = UserState::default();
        let query = format!(
            "filters=%%%&logLevels={}&mode=bogus&search=still+here",
            BASE64.encode("not json")
        );
        let decoded = decode_user_state(&UrlParams::parse(&query), base.clone());
        assert_eq!(decoded.filters, base.filters);
        assert_eq!(decoded.log_levels, LogLevel::ALL.to_vec());
        assert_eq!(decoded.mode, Mode::Normal);
        assert_eq!(decoded.search_term, "still here");
    }

    #[test]
    fn app_and_team_flags_append_filters_last() {
        let mut state = UserState::default();
        state.filters = vec![Filter::eq("level", "ERROR")];
        let mut params = encode_user_state(&state, None);
        params.set("team", "core");
        params.set("app", "api");
        let decoded = decode_user_state(&params, UserState::default());
        assert_eq!(
            decoded.filters,
            vec![
                Filter::eq("level", "ERROR"),
                Filter::eq("labels.app", "api"),
                Filter::eq("labels.team", "core"),
            ]
        );
    }

    #[test]
    fn selected_row_is_plain_json() {
        let mut state = UserState::default();
        state.selected_row = Some(RowSelection {
            timestamp: "t".into(),
            app: "a".into(),
            service: "s".into(),
            body: "b".into(),
        });
        let params = encode_user_state(&state, None);
        assert!(params.get("selectedRow").unwrap().starts_with('{'));
        let decoded = decode_user_state(&params, UserState::default());
        assert_eq!(decoded.selected_row, state.selected_row);
    }

    #[test]
    fn absolute_range_writes_iso_timestamps() {
        use chrono::{TimeZone, Utc};
        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
        );
        let params = encode_user_state(&UserState::default(), Some(&range));
        assert_eq!(params.get("from"), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(params.get("to"), Some("2024-01-01T01:00:00.000Z"));
    }

    #[test]
    fn memory_location_counts_replacements() {
        let loc = MemoryLocation::new("a=1");
        loc.replace("b=2");
        assert_eq!(loc.query(), "b=2");
        assert_eq!(loc.replacements(), 1);
    }
}
