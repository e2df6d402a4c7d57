//! Property tests for token bucket invariants.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::{Duration, Instant};

use proptest::prelude::*;
use toolguard_middleware::config::BucketRule;
use toolguard_middleware::policy::TokenBucket;

#[derive(Debug, Clone)]
enum Step {
    Admit(f64),
    Wait(u64),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0.0f64..8.0).prop_map(Step::Admit),
        (0u64..5_000).prop_map(Step::Wait),
    ]
}

proptest! {
    #[test]
    fn tokens_stay_within_bounds(
        capacity in 1u32..50,
        refill in 0.0f64..20.0,
        steps in prop::collection::vec(step_strategy(), 0..200),
    ) {
        let mut now = Instant::now();
        let mut bucket = TokenBucket::new(BucketRule { capacity, refill_per_sec: refill }, now);
        for step in steps {
            match step {
                Step::Admit(cost) => {
                    let before = bucket.projected(now);
                    let admitted = bucket.try_consume(cost, now);
                    prop_assert_eq!(admitted, before >= cost);
                    if !admitted {
                        prop_assert!((bucket.tokens() - before).abs() < 1e-9);
                    }
                }
                Step::Wait(ms) => now += Duration::from_millis(ms),
            }
            prop_assert!(bucket.tokens() >= 0.0);
            prop_assert!(bucket.tokens() <= f64::from(capacity));
            prop_assert!(bucket.projected(now) <= f64::from(capacity));
        }
    }

    #[test]
    fn capacity_consecutive_admits_then_reject(capacity in 1u32..100, refill in 0.0f64..10.0) {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(BucketRule { capacity, refill_per_sec: refill }, now);
        for _ in 0..capacity {
            prop_assert!(bucket.try_consume(1.0, now));
        }
        prop_assert!(!bucket.try_consume(1.0, now));
    }

    #[test]
    fn full_after_capacity_over_rate(capacity in 1u32..100, refill in 0.1f64..10.0) {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(BucketRule { capacity, refill_per_sec: refill }, start);
        while bucket.try_consume(1.0, start) {}
        let wait = Duration::from_secs_f64(f64::from(capacity) / refill);
        let later = start + wait;
        prop_assert!((bucket.projected(later) - f64::from(capacity)).abs() < 1e-6);
    }
}
