use chrono::{Duration, Utc};
use goahead::application::risk_management::{CooldownTracker, RateLimiter};
use goahead::infrastructure::persistence::InMemoryKeyValueStore;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// Many callers racing for the same key never get more slots than the limit.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_exceed_rate_limit() {
    let limiter = Arc::new(RateLimiter::with_window(5, Duration::minutes(10)));
    let now = Utc::now();

    let handles: Vec<_> = (0..64)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.is_allowed_at("equity", now).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 5);
    let state = limiter.get_state("equity").await.unwrap();
    assert_eq!(state.count, 5);
    assert!(limiter.retry_after_secs("equity", now).await > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cooldown_claims_have_one_winner() {
    let tracker = Arc::new(CooldownTracker::new());
    let now = Utc::now();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker
                    .try_begin_at("trainer:equities:5D", Duration::days(3), now, false)
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert!(tracker.is_in_cooldown_at("trainer:equities:5D", now).await);
}

#[tokio::test]
async fn test_forced_claim_always_wins_and_restarts_window() {
    let tracker = CooldownTracker::new();
    let start = Utc::now();
    let key = "equity:equities:5D";

    assert_ok!(tracker.try_begin_at(key, Duration::hours(1), start, false).await);
    let later = start + Duration::minutes(30);
    let blocking = assert_err!(tracker.try_begin_at(key, Duration::hours(1), later, false).await);
    assert_eq!(blocking.last_triggered_at, start);

    let forced = assert_ok!(tracker.try_begin_at(key, Duration::hours(1), later, true).await);
    assert_eq!(forced.last_triggered_at, later);
    assert_eq!(
        tracker.remaining_at(key, later).await,
        Duration::hours(1)
    );
}

#[tokio::test]
async fn test_guard_state_survives_restart() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let now = Utc::now();

    {
        let limiter = RateLimiter::with_window(2, Duration::hours(1)).with_store(store.clone());
        let tracker = CooldownTracker::new().with_store(store.clone());
        assert!(limiter.is_allowed_at("equity", now).await);
        assert!(limiter.is_allowed_at("equity", now).await);
        tracker
            .try_begin_at("equity:equities:5D", Duration::hours(1), now, false)
            .await
            .unwrap();
    }

    let limiter = RateLimiter::with_window(2, Duration::hours(1)).with_store(store.clone());
    let tracker = CooldownTracker::new().with_store(store);
    assert_eq!(limiter.restore().await, 1);
    assert_eq!(tracker.restore().await, 1);

    assert!(!limiter.is_allowed_at("equity", now).await);
    assert!(tracker.is_in_cooldown_at("equity:equities:5D", now).await);
}

/// The stored snapshot always reflects the last write, so concurrent claims on
/// distinct keys all survive a restart.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_all_reach_the_store() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let limiter = Arc::new(RateLimiter::with_window(3, Duration::hours(1)).with_store(store.clone()));
    let tracker = Arc::new(CooldownTracker::new().with_store(store.clone()));
    let now = Utc::now();

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let (limiter, tracker) = (limiter.clone(), tracker.clone());
            tokio::spawn(async move {
                let key = format!("agent{}", i);
                assert!(limiter.is_allowed_at(&key, now).await);
                assert_ok!(
                    tracker
                        .try_begin_at(&format!("{}:equities:5D", key), Duration::hours(1), now, false)
                        .await
                );
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let restored_limiter = RateLimiter::with_window(3, Duration::hours(1)).with_store(store.clone());
    let restored_tracker = CooldownTracker::new().with_store(store);
    assert_eq!(restored_limiter.restore().await, 32);
    assert_eq!(restored_tracker.restore().await, 32);
}
