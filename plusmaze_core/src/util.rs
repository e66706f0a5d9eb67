//! Common time helpers for plusmaze_core.

use std::time::Duration;

/// Number of seconds in one minute.
pub const SECS_PER_MIN: u64 = 60;

/// Operator-facing elapsed time, `mm:ss` (minutes keep growing past 59).
#[inline]
pub fn fmt_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}", secs / SECS_PER_MIN, secs % SECS_PER_MIN)
}

/// Time left until `hold` has fully elapsed.
#[inline]
pub fn remaining(hold: Duration, elapsed: Duration) -> Duration {
    hold.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(fmt_elapsed(Duration::from_millis(59_999)), "00:59");
        assert_eq!(fmt_elapsed(Duration::from_secs(61)), "01:01");
        assert_eq!(fmt_elapsed(Duration::from_secs(6000)), "100:00");
    }

    #[test]
    fn remaining_saturates() {
        assert_eq!(
            remaining(Duration::from_secs(10), Duration::from_secs(4)),
            Duration::from_secs(6)
        );
        assert_eq!(
            remaining(Duration::from_secs(10), Duration::from_secs(40)),
            Duration::ZERO
        );
    }
}
