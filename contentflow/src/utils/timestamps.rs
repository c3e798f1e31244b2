//! Timestamp helpers.

use chrono::{DateTime, SecondsFormat, Utc};

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as RFC 3339 with millisecond precision.
#[must_use]
pub fn iso_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_iso_timestamp_uses_millis_and_z() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).single().unwrap();
        assert_eq!(iso_timestamp(&ts), "2026-03-01T12:30:00.000Z");
    }
}
