//! Property tests for the retry backoff bound.

use llm_task_runner::services::RetryPolicy;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #[test]
    fn backoff_stays_within_jitter_window(
        base_ms in 0u64..2_000,
        extra_ms in 0u64..10_000,
        jitter_ms in 0u64..1_000,
        attempt in 1u32..40,
    ) {
        let base = Duration::from_millis(base_ms);
        let max = Duration::from_millis(base_ms + extra_ms);
        let jitter = Duration::from_millis(jitter_ms);
        let policy = RetryPolicy::new(5, base, max, jitter);

        let floor = policy.exponential_delay(attempt);
        let expected = base.saturating_mul(2u32.saturating_pow((attempt - 1).min(31))).min(max);
        prop_assert_eq!(floor, expected);

        let delay = policy.backoff_delay(attempt);
        prop_assert!(delay >= floor);
        // Float round trip on the jitter may add a nanosecond.
        prop_assert!(delay <= floor + jitter + Duration::from_nanos(1));
    }

    #[test]
    fn exponential_part_is_monotone(base_ms in 1u64..1_000, attempt in 1u32..39) {
        let policy = RetryPolicy::new(
            5,
            Duration::from_millis(base_ms),
            Duration::from_secs(30),
            Duration::ZERO,
        );
        prop_assert!(policy.exponential_delay(attempt) <= policy.exponential_delay(attempt + 1));
        prop_assert_eq!(policy.backoff_delay(attempt), policy.exponential_delay(attempt));
    }
}
