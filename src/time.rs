//! Calendar/timestamp helpers shared by ingest and the reference-store DAOs.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// `(date_id, time_id)` packed as `YYYYMMDD` / `HHMMSS`, mirroring the reference
/// store's integer calendar columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarIds {
    pub date_id: i32,
    pub time_id: i32,
}

/// Parse a `YYYY-MM-DDTHH:MM:SSZ` timestamp into its UTC instant.
pub fn parse_iso8601(tstamp: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(tstamp, "%Y-%m-%dT%H:%M:%SZ")
        .with_context(|| format!("unparseable timestamp '{tstamp}'"))?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

pub fn calendar_ids(ts: &DateTime<Utc>) -> CalendarIds {
    CalendarIds {
        date_id: ts.format("%Y%m%d").to_string().parse().unwrap(),
        time_id: ts.format("%H%M%S").to_string().parse().unwrap(),
    }
}

pub fn seconds_in_day(ts: &DateTime<Utc>) -> i32 {
    use chrono::Timelike;
    (ts.hour() * 3600 + ts.minute() * 60 + ts.second()) as i32
}

/// Inverse of [`calendar_ids`], matching the reference store's `iso8601fromids` helper.
pub fn iso8601_from_ids(date_id: i32, time_id: i32) -> String {
    let year = date_id / 10000;
    let month = (date_id / 100) % 100;
    let day = date_id % 100;
    let hour = time_id / 10000;
    let minute = (time_id / 100) % 100;
    let second = time_id % 100;
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Signed difference in seconds between two packed calendar points,
/// `b - a`. Used for window tests that must not assume same-day inputs
/// (±period/2 windows can straddle midnight).
pub fn seconds_between(date_id_a: i32, time_id_a: i32, date_id_b: i32, time_id_b: i32) -> Result<i64> {
    let a = parse_iso8601(&iso8601_from_ids(date_id_a, time_id_a))?;
    let b = parse_iso8601(&iso8601_from_ids(date_id_b, time_id_b))?;
    Ok((b - a).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_packs_calendar_ids() {
        let ts = parse_iso8601("2024-01-01T00:00:15Z").unwrap();
        let ids = calendar_ids(&ts);
        assert_eq!(ids.date_id, 20240101);
        assert_eq!(ids.time_id, 15);
        assert_eq!(seconds_in_day(&ts), 15);
    }

    #[test]
    fn round_trips_iso8601_from_ids() {
        assert_eq!(iso8601_from_ids(20240101, 120000), "2024-01-01T12:00:00Z");
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert!(parse_iso8601("not-a-timestamp").is_err());
    }

    #[test]
    fn seconds_between_handles_midnight_crossing() {
        assert_eq!(seconds_between(20240101, 235955, 20240102, 5).unwrap(), 10);
    }
}
