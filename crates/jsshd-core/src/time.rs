//! Time utilities for jsshd
//!
//! Provides common time-related operations used across crates.

use chrono::{SecondsFormat, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in seconds.
///
/// Returns 0 if the system clock reads earlier than the Unix epoch.
pub fn current_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current UTC time as an RFC 3339 string with second precision,
/// e.g. `2024-05-01T12:00:00Z`.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_secs_is_positive() {
        assert!(current_time_secs() > 0);
    }

    #[test]
    fn test_utc_timestamp_is_rfc3339() {
        let stamp = utc_timestamp();
        let parsed = chrono::DateTime::parse_from_rfc3339(&stamp).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert!(stamp.ends_with('Z'));
    }
}
