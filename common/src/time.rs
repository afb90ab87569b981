//! Time utilities and the warm-up validity window.

use chrono::{DateTime, Timelike, Utc};

/// Protocol timing constants.
pub mod constants {
    use std::time::Duration;

    /// TTL for the `cache` resource lock.
    pub const CACHE_LOCK_TTL: Duration = Duration::from_millis(5000);

    /// TTL for the `warmup` resource lock.
    pub const WARMUP_LOCK_TTL: Duration = Duration::from_millis(5000);

    /// Default simulated work duration for an update.
    pub const DEFAULT_OPERATION_DURATION: Duration = Duration::from_millis(2000);

    /// Fixed clock drift allowance added on top of the drift factor.
    pub const CLOCK_DRIFT_ESTIMATE: Duration = Duration::from_millis(2);
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check whether `timestamp` lies in the same UTC minute as `reference`.
///
/// Year, month, day, hour and minute must all match, so the window rolls
/// over on the minute boundary rather than after a fixed TTL.
pub fn is_within_minute_of(timestamp: Timestamp, reference: Timestamp) -> bool {
    timestamp.date_naive() == reference.date_naive()
        && timestamp.hour() == reference.hour()
        && timestamp.minute() == reference.minute()
}

/// Check whether `timestamp` lies in the current validity window.
pub fn is_within_current_minute(timestamp: Timestamp) -> bool {
    is_within_minute_of(timestamp, now())
}

/// Parse an RFC 3339 timestamp as stored in the key-value store.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Format a timestamp for storage.
pub fn format_timestamp(timestamp: Timestamp) -> String {
    timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    #[test]
    fn test_same_minute() {
        let reference = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 59).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert!(is_within_minute_of(earlier, reference));
    }

    #[test]
    fn test_previous_minute_is_stale() {
        let reference = Utc.with_ymd_and_hms(2024, 5, 1, 12, 31, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 59).unwrap();
        assert!(!is_within_minute_of(earlier, reference));
    }

    #[test]
    fn test_same_minute_different_day_is_stale() {
        let reference = Utc.with_ymd_and_hms(2024, 5, 2, 12, 30, 10).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 10).unwrap();
        assert!(!is_within_minute_of(earlier, reference));
    }

    #[test]
    fn test_timestamp_roundtrip_keeps_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 10).unwrap() + Duration::milliseconds(123);
        assert_eq!(parse_timestamp(&format_timestamp(ts)), Some(ts));
        assert_eq!(parse_timestamp("not a timestamp"), None);
    }

    proptest! {
        #[test]
        fn prop_window_matches_truncated_minute(secs in 0i64..4_000_000_000, offset in -200i64..200) {
            let reference = Utc.timestamp_opt(secs, 0).unwrap();
            let other = reference + Duration::seconds(offset);
            let same = reference.timestamp().div_euclid(60) == other.timestamp().div_euclid(60);
            prop_assert_eq!(is_within_minute_of(other, reference), same);
        }
    }
}
