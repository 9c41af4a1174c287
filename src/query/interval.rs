use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

static REFRESH_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)([smhd])$").expect("refresh code regex"));

/// Decode an auto-refresh code such as `30s` or `5m`.
///
/// Empty, zero, malformed or overflowing codes all mean "disabled".
pub fn parse_refresh_interval(code: &str) -> Option<Duration> {
    let caps = REFRESH_CODE.captures(code.trim())?;
    let amount: u64 = caps[1].parse().ok()?;
    if amount == 0 {
        return None;
    }
    let unit_secs = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => 86_400,
    };
    amount.checked_mul(unit_secs).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_codes_decode() {
        assert_eq!(parse_refresh_interval("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_refresh_interval("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_refresh_interval("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_refresh_interval("2d"), Some(Duration::from_secs(172_800)));
    }

    #[test]
    fn invalid_codes_disable() {
        for code in ["", "0s", "5", "m", "5w", "-5s", "1.5m", "99999999999999999999s"] {
            assert_eq!(parse_refresh_interval(code), None, "code {code:?}");
        }
    }
}
