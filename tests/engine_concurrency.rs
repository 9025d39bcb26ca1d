use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tiered_rate_limiter::rate_limit::{InMemoryCounterStore, Limit, PeriodType, RateLimitEngine, RateLimits};

fn limits(hourly: u64) -> RateLimits {
    RateLimits {
        hourly: Limit::Bounded(hourly),
        daily: Limit::Unlimited,
        monthly: Limit::Unlimited,
    }
}

// key: concurrency-contract -> spec §5's bounded-overshoot tolerance
#[tokio::test]
async fn concurrent_admissions_never_exceed_limit_plus_fanout() {
    let engine = Arc::new(RateLimitEngine::new(Arc::new(InMemoryCounterStore::new())));
    let now = Utc.with_ymd_and_hms(2025, 6, 15, 14, 0, 0).unwrap();
    let limit = 5u64;
    let fanout = 10usize;

    let mut handles = Vec::new();
    for _ in 0..fanout {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .check_and_increment("contended-user", limits(limit), None, now)
                .await
                .unwrap()
        }));
    }

    let mut admitted = 0usize;
    for handle in handles {
        let decision = handle.await.unwrap();
        if decision.allowed {
            admitted += 1;
        }
    }

    assert!(
        admitted as u64 <= limit + fanout as u64,
        "admitted {admitted} must not exceed limit ({limit}) plus fanout ({fanout})"
    );
    assert!(admitted > 0, "at least the first admissions must succeed");
}

// key: admission-monotonicity -> admitting never decreases, rejecting never changes
#[tokio::test]
async fn admission_is_monotonic() {
    let engine = RateLimitEngine::new(Arc::new(InMemoryCounterStore::new()));
    let now = Utc.with_ymd_and_hms(2025, 6, 15, 14, 0, 0).unwrap();
    let bounded = limits(2);

    let first = engine
        .check_and_increment("mono-user", bounded, None, now)
        .await
        .unwrap();
    assert!(first.allowed);
    let second = engine
        .check_and_increment("mono-user", bounded, None, now)
        .await
        .unwrap();
    assert!(second.allowed);
    assert!(second.remaining.hourly.unwrap() < first.remaining.hourly.unwrap());

    let rejected_before = engine
        .check_only("mono-user", bounded, None, now)
        .await
        .unwrap();
    let third = engine
        .check_and_increment("mono-user", bounded, None, now)
        .await
        .unwrap();
    assert!(!third.allowed);
    let rejected_after = engine
        .check_only("mono-user", bounded, None, now)
        .await
        .unwrap();
    assert_eq!(rejected_before.remaining.hourly, rejected_after.remaining.hourly);

    assert_eq!(rejected_after.remaining.hourly.unwrap(), 0);
    assert_eq!(PeriodType::Hourly.as_str(), "hourly");
}
