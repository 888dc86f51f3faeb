// SPDX-License-Identifier: Apache-2.0
use chrono::Duration;

/// Fixed back-off schedule indexed by `attempt_count - 1`, clamped to the
/// last entry for any attempt beyond the table's length.
const SCHEDULE_SECS: [i64; 5] = [1, 5, 15, 60, 300];

pub fn backoff_for_attempt(attempt_count: u32) -> Duration {
    let idx = attempt_count.saturating_sub(1) as usize;
    let secs = SCHEDULE_SECS[idx.min(SCHEDULE_SECS.len() - 1)];
    Duration::seconds(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_monotonic_schedule() {
        assert_eq!(backoff_for_attempt(1), Duration::seconds(1));
        assert_eq!(backoff_for_attempt(2), Duration::seconds(5));
        assert_eq!(backoff_for_attempt(3), Duration::seconds(15));
        assert_eq!(backoff_for_attempt(4), Duration::seconds(60));
        assert_eq!(backoff_for_attempt(5), Duration::seconds(300));
    }

    #[test]
    fn backoff_clamps_beyond_table_length() {
        assert_eq!(backoff_for_attempt(6), Duration::seconds(300));
        assert_eq!(backoff_for_attempt(100), Duration::seconds(300));
    }

    #[test]
    fn backoff_clamps_attempt_zero_to_first_entry() {
        assert_eq!(backoff_for_attempt(0), Duration::seconds(1));
    }
}
