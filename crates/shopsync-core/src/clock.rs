//! # Clock Helpers
//!
//! All sync timestamps are UTC with millisecond precision. SQLite stores
//! them as INTEGER epoch millis so comparisons are plain integer compares
//! and never depend on text formatting.

use chrono::{DateTime, Duration, Utc};

use crate::error::{CoreError, CoreResult};

/// Current time truncated to whole milliseconds.
pub fn now() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Drops sub-millisecond precision.
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Epoch millis for storage.
#[inline]
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Timestamp from stored epoch millis.
pub fn from_millis(ms: i64) -> CoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(CoreError::InvalidTimestamp(ms))
}

/// Default checkpoint position: the Unix epoch.
pub fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Version stamp for a local mutation of a row last stamped `previous`.
///
/// Returns `now` unless that would not move the row forward (two writes in
/// the same millisecond, or a wall clock that stepped back), in which case
/// the row advances by one millisecond. Every local write therefore carries
/// a strictly newer `updated_at` than the snapshot it replaces.
pub fn next_version(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_millis(now);
    if now > previous {
        now
    } else {
        truncate_millis(previous) + Duration::milliseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_millis_round_trip_is_lossless_at_ms() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap() + Duration::milliseconds(123);
        assert_eq!(from_millis(to_millis(ts)).unwrap(), ts);
    }

    #[test]
    fn test_truncate_drops_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
            + Duration::microseconds(1_500);
        assert_eq!(to_millis(truncate_millis(ts)), to_millis(ts));
        assert_eq!(truncate_millis(ts).timestamp_subsec_micros(), 1_000);
    }

    #[test]
    fn test_next_version_moves_forward() {
        let previous = from_millis(5_000).unwrap();

        // Clock ahead: use the clock
        assert_eq!(next_version(from_millis(6_000).unwrap(), previous), from_millis(6_000).unwrap());

        // Same millisecond or clock behind: bump by one
        assert_eq!(next_version(previous, previous), from_millis(5_001).unwrap());
        assert_eq!(next_version(from_millis(4_000).unwrap(), previous), from_millis(5_001).unwrap());
    }

    #[test]
    fn test_epoch_is_zero() {
        assert_eq!(to_millis(epoch()), 0);
    }

    #[test]
    fn test_out_of_range_millis_rejected() {
        assert!(matches!(from_millis(i64::MAX), Err(CoreError::InvalidTimestamp(_))));
    }
}
