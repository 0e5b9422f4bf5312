//! Wall-clock helpers. Persisted timestamps are unix milliseconds.

use chrono::{DateTime, Utc};

/// Current time as unix milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render unix milliseconds as an RFC 3339 string (UTC, second precision).
#[must_use]
pub fn to_rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 timestamp into unix milliseconds.
pub fn parse_rfc3339(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

/// `YYYY-MM-DD` for the UTC day containing `ms`.
#[must_use]
pub fn utc_date(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trip_is_second_precise() {
        let ms = 1_700_000_000_000;
        let text = to_rfc3339(ms);
        assert_eq!(text, "2023-11-14T22:13:20Z");
        assert_eq!(parse_rfc3339(&text), Some(ms));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_rfc3339("yesterday"), None);
    }

    #[test]
    fn date_bucket() {
        assert_eq!(utc_date(1_700_000_000_000), "2023-11-14");
    }
}
