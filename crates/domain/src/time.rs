//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for `created` / `modified` bookkeeping.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Nanoseconds since the Unix epoch, as carried by system events.
///
/// Saturates at `i64::MAX` for instants past the year 2262.
#[must_use]
pub fn unix_nanos(ts: Timestamp) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_convert_epoch_to_zero_nanos() {
        assert_eq!(unix_nanos(DateTime::<Utc>::UNIX_EPOCH), 0);
    }

    #[test]
    fn should_count_nanoseconds_after_epoch() {
        let ts = DateTime::<Utc>::from_timestamp(1, 500).unwrap();
        assert_eq!(unix_nanos(ts), 1_000_000_500);
    }
}
