use carboncat::model::types::{LogLevel, Mode, RowSelection};
use carboncat::persist::url::{UrlParams, decode_user_state, encode_user_state};
use carboncat::{Filter, UserState};

#[test]
fn filters_survive_a_round_trip() {
    let mut state = UserState::default();
    state.filters = vec![Filter::eq("level", "ERROR")];
    let query = encode_user_state(&state, None).to_query_string();
    let decoded = decode_user_state(&UrlParams::parse(&query), UserState::default());
    assert_eq!(decoded.filters, state.filters);
}

#[test]
fn full_state_round_trips() {
    let state = UserState {
        mode: Mode::Sql,
        sql_expression: Some("SELECT * FROM otel_logs_cc LIMIT 10".into()),
        search_term: "connection reset".into(),
        filters: vec![Filter::eq("labels.app", "api & web")],
        time_from: "now-1h".into(),
        time_to: "now".into(),
        datasource: "datasource-clickhouse-platform".into(),
        log_levels: vec![LogLevel::Warn, LogLevel::Error],
        refresh_interval: "30s".into(),
        selected_row: Some(RowSelection {
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            app: "api".into(),
            service: "web".into(),
            body: "boom".into(),
        }),
        selected_fields: vec!["level".into(), "body".into()],
        selected_labels: vec!["labels.app".into()],
        streaming_mode: false,
    };
    let query = encode_user_state(&state, None).to_query_string();
    let decoded = decode_user_state(&UrlParams::parse(&query), UserState::default());
    assert_eq!(decoded, state);
}

#[test]
fn lone_from_is_ignored() {
    let decoded = decode_user_state(&UrlParams::parse("?from=now-1d"), UserState::default());
    assert_eq!(decoded.time_from, "now-5m");
    assert_eq!(decoded.time_to, "now");
}

#[test]
fn convenience_flags_append_after_stored_filters() {
    let mut state = UserState::default();
    state.filters = vec![Filter::eq("level", "WARN")];
    let query = format!(
        "{}&team=core&app=api",
        encode_user_state(&state, None).to_query_string()
    );
    let decoded = decode_user_state(&UrlParams::parse(&query), UserState::default());
    assert_eq!(
        decoded.filters,
        vec![
            Filter::eq("level", "WARN"),
            Filter::eq("labels.app", "api"),
            Filter::eq("labels.team", "core"),
        ]
    );
}

#[test]
fn malformed_composites_keep_base_values() {
    let base = UserState::default();
    let decoded = decode_user_state(
        &UrlParams::parse("logLevels=bm90IGpzb24&fields=!!&search=x"),
        base.clone(),
    );
    assert_eq!(decoded.log_levels, base.log_levels);
    assert_eq!(decoded.selected_fields, base.selected_fields);
    assert_eq!(decoded.search_term, "x");
}
