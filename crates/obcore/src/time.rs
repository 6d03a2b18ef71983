use chrono::Utc;
use std::time::{Duration, SystemTime};

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01).
#[inline]
pub fn timestamp_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Wall-clock deadline computed `secs` from now, used by `pop_wait`'s timeout.
#[inline]
pub fn deadline_from(secs: f64) -> SystemTime {
    SystemTime::now() + Duration::from_secs_f64(secs.max(0.0))
}

/// Current time as an RFC 3339 string, for human-readable log lines and
/// diagnostics that need more than a raw epoch count.
#[inline]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_plausible() {
        let now = timestamp_secs();
        assert!(now > 1_700_000_000);
    }

    #[test]
    fn rfc3339_string_has_date_separators() {
        let s = now_rfc3339();
        assert!(s.contains('-') && s.contains('T'));
    }
}
