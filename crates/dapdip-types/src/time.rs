use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

/// SQLite's `datetime('now')` produces "YYYY-MM-DD HH:MM:SS" without a
/// timezone; rows written by the application may carry RFC 3339 instead.
/// Accept both, falling back to the epoch on corrupt data.
pub fn parse_db_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

/// Format a timestamp the way SQLite's `datetime('now')` does, so stored
/// values compare correctly against it in SQL.
pub fn format_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_sqlite_format() {
        let ts = parse_db_timestamp("2026-03-01 12:30:00");
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn parses_rfc3339() {
        let ts = parse_db_timestamp("2026-03-01T12:30:00Z");
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn format_round_trips_through_parse() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_db_timestamp(&format_db_timestamp(ts)), ts);
    }

    #[test]
    fn corrupt_input_falls_back_to_epoch() {
        assert_eq!(parse_db_timestamp("not a date"), DateTime::<Utc>::default());
    }
}
