//! Time-window resolution.
//!
//! Windows are stored raw (`now-5m`, an ISO timestamp, ...) in the user
//! state and resolved to absolute instants against an explicit `now`.

use chrono::{DateTime, Duration, Months, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^now\s*(?:([+-])\s*(\d+)\s*([smhdwMy]))?$").expect("relative time regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeRangeError {
    #[error("cannot parse time expression '{0}'")]
    Unparseable(String),

    #[error("time range starts after it ends ({from} > {to})")]
    Inverted { from: String, to: String },
}

/// An absolute time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Resolve raw `from`/`to` expressions relative to `now`.
    pub fn resolve(from_raw: &str, to_raw: &str, now: DateTime<Utc>) -> Result<Self, TimeRangeError> {
        let from = parse_time_expr(from_raw, now)?;
        let to = parse_time_expr(to_raw, now)?;
        if from > to {
            return Err(TimeRangeError::Inverted {
                from: from_raw.to_string(),
                to: to_raw.to_string(),
            });
        }
        Ok(Self { from, to })
    }

    pub fn total_seconds(&self) -> f64 {
        (self.to - self.from).num_milliseconds() as f64 / 1000.0
    }

    /// Both ends as ISO-8601 strings with millisecond precision.
    pub fn to_iso(&self) -> (String, String) {
        (iso(self.from), iso(self.to))
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse one raw time expression.
///
/// Accepts `now`, `now-N<unit>` / `now+N<unit>` with units `s m h d w M y`,
/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC), and epoch milliseconds.
pub fn parse_time_expr(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeRangeError> {
    let raw_trimmed = raw.trim();
    let err = || TimeRangeError::Unparseable(raw.to_string());

    if let Some(caps) = RELATIVE.captures(raw_trimmed) {
        let Some(sign) = caps.get(1) else {
            return Ok(now);
        };
        let amount: u32 = caps[2].parse().map_err(|_| err())?;
        let forward = sign.as_str() == "+";
        let shifted = match &caps[3] {
            "M" | "y" => {
                let months = if &caps[3] == "y" {
                    amount.checked_mul(12).ok_or_else(err)?
                } else {
                    amount
                };
                if forward {
                    now.checked_add_months(Months::new(months))
                } else {
                    now.checked_sub_months(Months::new(months))
                }
            }
            unit => {
                let amount = i64::from(amount);
                let delta = match unit {
                    "s" => Duration::try_seconds(amount),
                    "m" => Duration::try_minutes(amount),
                    "h" => Duration::try_hours(amount),
                    "d" => Duration::try_days(amount),
                    _ => Duration::try_weeks(amount),
                }
                .ok_or_else(err)?;
                if forward {
                    now.checked_add_signed(delta)
                } else {
                    now.checked_sub_signed(delta)
                }
            }
        };
        return shifted.ok_or_else(err);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw_trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw_trimmed, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(ms) = raw_trimmed.parse::<i64>() {
        return Utc.timestamp_millis_opt(ms).single().ok_or_else(err);
    }
    Err(err())
}

/// Adaptive histogram bucket width. Not rounded: fractional seconds are
/// valid bucket widths.
pub fn bucket_width_secs(total_seconds: f64) -> f64 {
    if total_seconds < 10.0 {
        total_seconds
    } else if total_seconds < 60.0 {
        total_seconds / 5.0
    } else if total_seconds < 120.0 {
        total_seconds / 50.0
    } else {
        total_seconds / 100.0
    }
}

/// Coarse "N units ago" rendering of `ts` relative to `now`.
pub fn time_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    let (n, unit) = if secs < 60 {
        (secs, "second")
    } else if secs < 3600 {
        (secs / 60, "minute")
    } else if secs < 86_400 {
        (secs / 3600, "hour")
    } else {
        (secs / 86_400, "day")
    };
    let plural = if n == 1 { "" } else { "s" };
    format!("{n} {unit}{plural} ago")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_expressions_resolve_against_now() {
        let now = fixed_now();
        let range = TimeRange::resolve("now-5m", "now", now).unwrap();
        assert_eq!(range.to, now);
        assert_eq!(range.total_seconds(), 300.0);

        let week = parse_time_expr("now-1w", now).unwrap();
        assert_eq!((now - week).num_days(), 7);
        let month = parse_time_expr("now-1M", now).unwrap();
        assert_eq!(month, Utc.with_ymd_and_hms(2024, 2, 15, 12, 0, 0).unwrap());
        let ahead = parse_time_expr("now+2h", now).unwrap();
        assert_eq!((ahead - now).num_hours(), 2);
    }

    #[test]
    fn absolute_forms_parse() {
        let now = fixed_now();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 8, 30, 0).unwrap();
        assert_eq!(parse_time_expr("2024-01-01T08:30:00Z", now).unwrap(), expected);
        assert_eq!(parse_time_expr("2024-01-01T10:30:00+02:00", now).unwrap(), expected);
        assert_eq!(parse_time_expr("2024-01-01 08:30:00", now).unwrap(), expected);
        assert_eq!(
            parse_time_expr(&expected.timestamp_millis().to_string(), now).unwrap(),
            expected
        );
    }

    #[test]
    fn garbage_is_rejected() {
        let err = parse_time_expr("yesterday", fixed_now()).unwrap_err();
        assert_eq!(err, TimeRangeError::Unparseable("yesterday".into()));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = TimeRange::resolve("now", "now-1h", fixed_now()).unwrap_err();
        assert!(matches!(err, TimeRangeError::Inverted { .. }));
    }

    #[test]
    fn bucket_width_regimes() {
        assert_eq!(bucket_width_secs(5.0), 5.0);
        assert_eq!(bucket_width_secs(30.0), 6.0);
        assert!((bucket_width_secs(90.0) - 1.8).abs() < 1e-9);
        assert_eq!(bucket_width_secs(3600.0), 36.0);
    }

    #[test]
    fn time_ago_picks_largest_unit() {
        let now = fixed_now();
        assert_eq!(time_ago(now - Duration::seconds(1), now), "1 second ago");
        assert_eq!(time_ago(now - Duration::seconds(59), now), "59 seconds ago");
        assert_eq!(time_ago(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(time_ago(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(time_ago(now - Duration::days(3), now), "3 days ago");
    }
}
