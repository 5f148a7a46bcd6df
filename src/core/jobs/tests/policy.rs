use std::time::Duration;

use crate::core::jobs::{Backoff, RetryPolicy};

#[test]
fn default_policy_polls_every_ten_seconds_for_ten_minutes() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.interval, Duration::from_secs(10));
    assert_eq!(policy.max_attempts, 60);
    assert_eq!(policy.delay_after(1), Duration::from_secs(10));
    assert_eq!(policy.delay_after(59), Duration::from_secs(10));
    assert_eq!(policy.budget(), Duration::from_secs(590));
}

#[test]
fn exponential_backoff_grows_and_caps() {
    let policy = RetryPolicy {
        interval: Duration::from_secs(2),
        max_attempts: 10,
        backoff: Backoff::Exponential {
            factor: 2.0,
            max_interval: Duration::from_secs(10),
        },
    };
    assert_eq!(policy.delay_after(1), Duration::from_secs(2));
    assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    assert_eq!(policy.delay_after(4), Duration::from_secs(10));
    assert_eq!(policy.delay_after(500), Duration::from_secs(10));
}

#[test]
fn factor_below_one_behaves_like_fixed() {
    let policy = RetryPolicy {
        interval: Duration::from_secs(3),
        max_attempts: 5,
        backoff: Backoff::Exponential {
            factor: 0.5,
            max_interval: Duration::from_secs(60),
        },
    };
    assert_eq!(policy.delay_after(4), Duration::from_secs(3));
}

#[test]
fn huge_caps_neither_panic_nor_overflow() {
    let policy = RetryPolicy {
        interval: Duration::from_secs(u64::MAX / 2),
        max_attempts: u32::MAX,
        backoff: Backoff::Exponential {
            factor: 10.0,
            max_interval: Duration::MAX,
        },
    };
    assert_eq!(policy.delay_after(40), Duration::MAX);
    let short = RetryPolicy {
        max_attempts: 4,
        ..policy
    };
    assert_eq!(short.budget(), Duration::MAX);
}
