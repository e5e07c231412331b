use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use staleguard::cache::{
    CacheConfig, CacheDomain, CacheDomainConfig, CacheEngine, CacheStatus, FetchError,
};
use tokio::time::{advance, sleep};

fn fetch_value(
    calls: &Arc<AtomicUsize>,
    value: u32,
    delay: Duration,
) -> impl Future<Output = Result<u32, FetchError>> + Send + 'static {
    let calls = Arc::clone(calls);
    async move {
        calls.fetch_add(1, Ordering::SeqCst);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        Ok(value)
    }
}

fn fetch_error(
    calls: &Arc<AtomicUsize>,
) -> impl Future<Output = Result<u32, FetchError>> + Send + 'static {
    let calls = Arc::clone(calls);
    async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::upstream("numbers", "503 Service Unavailable"))
    }
}

async fn explode() -> Result<u32, FetchError> {
    panic!("fetcher exploded")
}

/// Let spawned refresh tasks run to completion.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

fn domain(engine: &CacheEngine, ttl_ms: u64, stale_ms: u64, max: usize) -> Arc<CacheDomain<u32>> {
    engine.domain("numbers", CacheDomainConfig::from_millis(ttl_ms, stale_ms, max))
}

#[tokio::test(start_paused = true)]
async fn concurrent_cold_reads_share_one_fetch() {
    let engine = CacheEngine::new(CacheConfig::default());
    let numbers = domain(&engine, 1_000, 5_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    let reads = (0..8).map(|_| {
        numbers.read("k", || fetch_value(&calls, 42, Duration::from_millis(50)))
    });
    let results = join_all(reads).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        let read = result.expect("read succeeds");
        assert_eq!(*read.value, 42);
        assert_eq!(read.status, CacheStatus::Miss);
    }
    assert!(!numbers.is_in_flight("k"));
}

#[tokio::test(start_paused = true)]
async fn freshness_tiers_follow_entry_age() {
    let engine = CacheEngine::new(CacheConfig::default());
    let numbers = domain(&engine, 1_000, 5_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = numbers
        .read("k", || fetch_value(&calls, 1, Duration::ZERO))
        .await
        .expect("cold read");
    assert_eq!(first.status, CacheStatus::Miss);

    advance(Duration::from_millis(500)).await;
    let fresh = numbers
        .read("k", || fetch_value(&calls, 2, Duration::ZERO))
        .await
        .expect("fresh read");
    assert_eq!(fresh.status, CacheStatus::Hit);
    assert_eq!(*fresh.value, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    advance(Duration::from_millis(2_500)).await;
    let stale = numbers
        .read("k", || fetch_value(&calls, 2, Duration::ZERO))
        .await
        .expect("stale read");
    assert_eq!(stale.status, CacheStatus::Stale);
    assert_eq!(*stale.value, 1);

    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let refreshed = numbers
        .read("k", || fetch_value(&calls, 3, Duration::ZERO))
        .await
        .expect("refreshed read");
    assert_eq!(refreshed.status, CacheStatus::Hit);
    assert_eq!(*refreshed.value, 2);

    advance(Duration::from_millis(9_000)).await;
    let expired = numbers
        .read("k", || fetch_value(&calls, 4, Duration::ZERO))
        .await
        .expect("expired read");
    assert_eq!(expired.status, CacheStatus::Miss);
    assert_eq!(*expired.value, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn stale_reads_trigger_a_single_background_refresh() {
    let engine = CacheEngine::new(CacheConfig::default());
    let numbers = domain(&engine, 1_000, 5_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    numbers
        .read("k", || fetch_value(&calls, 1, Duration::ZERO))
        .await
        .expect("cold read");
    advance(Duration::from_millis(2_000)).await;

    let first = numbers
        .read("k", || fetch_value(&calls, 2, Duration::from_millis(100)))
        .await
        .expect("first stale read");
    advance(Duration::from_millis(10)).await;
    let second = numbers
        .read("k", || fetch_value(&calls, 3, Duration::from_millis(100)))
        .await
        .expect("second stale read");

    assert_eq!(first.status, CacheStatus::Stale);
    assert_eq!(second.status, CacheStatus::Stale);
    assert_eq!(*second.value, 1);
    assert!(numbers.is_in_flight("k"));

    sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!numbers.is_in_flight("k"));
    assert_eq!(numbers.peek("k").map(|entry| **entry.value()), Some(2));
}

#[tokio::test(start_paused = true)]
async fn capacity_evicts_the_oldest_fetched_entry() {
    let engine = CacheEngine::new(CacheConfig::default());
    let numbers = domain(&engine, 60_000, 60_000, 3);
    let calls = Arc::new(AtomicUsize::new(0));

    for (value, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
        numbers
            .read(key, || fetch_value(&calls, value as u32, Duration::ZERO))
            .await
            .expect("cold read");
        advance(Duration::from_millis(1)).await;
    }

    assert_eq!(numbers.len(), 3);
    assert!(numbers.peek("a").is_none());
    for key in ["b", "c", "d"] {
        assert!(numbers.peek(key).is_some(), "{key} should be retained");
    }
}

#[tokio::test(start_paused = true)]
async fn sweep_drops_entries_past_their_stale_window() {
    let engine = CacheEngine::new(CacheConfig::default());
    let numbers = domain(&engine, 1_000, 2_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    numbers
        .read("old", || fetch_value(&calls, 1, Duration::ZERO))
        .await
        .expect("cold read");
    advance(Duration::from_millis(1_500)).await;
    numbers
        .read("young", || fetch_value(&calls, 2, Duration::ZERO))
        .await
        .expect("cold read");
    advance(Duration::from_millis(1_000)).await;

    assert_eq!(engine.sweep_now(), 1);
    assert!(numbers.peek("old").is_none());
    assert!(numbers.peek("young").is_some());
}

#[tokio::test(start_paused = true)]
async fn periodic_sweeper_runs_on_its_interval() {
    let engine = CacheEngine::new(CacheConfig {
        sweep_interval: Duration::from_secs(60),
        ..CacheConfig::default()
    });
    let numbers = domain(&engine, 1_000, 2_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    numbers
        .read("k", || fetch_value(&calls, 1, Duration::ZERO))
        .await
        .expect("cold read");
    engine.start();
    assert!(engine.is_running());

    sleep(Duration::from_secs(61)).await;
    assert!(numbers.is_empty());

    engine.stop();
    assert!(!engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_serving_the_stale_value() {
    let engine = CacheEngine::new(CacheConfig::default());
    let numbers = domain(&engine, 1_000, 5_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    numbers
        .read("k", || fetch_value(&calls, 7, Duration::ZERO))
        .await
        .expect("cold read");
    advance(Duration::from_millis(2_000)).await;

    let stale = numbers
        .read("k", || fetch_error(&calls))
        .await
        .expect("stale value still served");
    assert_eq!(stale.status, CacheStatus::Stale);
    assert_eq!(*stale.value, 7);

    settle().await;
    assert!(!numbers.is_in_flight("k"));
    assert_eq!(numbers.peek("k").map(|entry| **entry.value()), Some(7));

    let again = numbers
        .read("k", || fetch_error(&calls))
        .await
        .expect("stale value still served");
    assert_eq!(again.status, CacheStatus::Stale);
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn cold_failure_propagates_and_caches_nothing() {
    let engine = CacheEngine::new(CacheConfig::default());
    let numbers = domain(&engine, 1_000, 5_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    let reads = (0..3).map(|_| numbers.read("k", || fetch_error(&calls)));
    for result in join_all(reads).await {
        let err = result.expect_err("cold failure propagates");
        assert_eq!(err.to_string(), "numbers: 503 Service Unavailable");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(numbers.peek("k").is_none());
    assert!(!numbers.is_in_flight("k"));

    let recovered = numbers
        .read("k", || fetch_value(&calls, 5, Duration::ZERO))
        .await
        .expect("next read fetches again");
    assert_eq!(*recovered.value, 5);
}

#[tokio::test(start_paused = true)]
async fn panicking_fetcher_does_not_wedge_the_key() {
    let engine = CacheEngine::new(CacheConfig::default());
    let numbers = domain(&engine, 1_000, 5_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    let err = numbers
        .read("k", explode)
        .await
        .expect_err("panic surfaces as an error");
    assert!(matches!(err, FetchError::Panicked { .. }));
    assert!(!numbers.is_in_flight("k"));

    let read = numbers
        .read("k", || fetch_value(&calls, 9, Duration::ZERO))
        .await
        .expect("key usable again");
    assert_eq!(*read.value, 9);
}

#[tokio::test(start_paused = true)]
async fn disabled_engine_always_fetches() {
    let engine = CacheEngine::new(CacheConfig::bypass());
    let numbers = domain(&engine, 60_000, 60_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    for value in 0..3 {
        let read = numbers
            .read("k", || fetch_value(&calls, value, Duration::ZERO))
            .await
            .expect("bypass read");
        assert_eq!(read.status, CacheStatus::Miss);
        assert_eq!(*read.value, value);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(numbers.is_empty());

    engine.start();
    assert!(!engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn domains_are_isolated() {
    let engine = CacheEngine::new(CacheConfig::default());
    let tiles: Arc<CacheDomain<u32>> =
        engine.domain("tiles", CacheDomainConfig::from_millis(1_000, 5_000, 2));
    let events: Arc<CacheDomain<u32>> =
        engine.domain("events", CacheDomainConfig::from_millis(1_000, 5_000, 2));
    let calls = Arc::new(AtomicUsize::new(0));

    tiles
        .read("shared", || fetch_value(&calls, 1, Duration::ZERO))
        .await
        .expect("tiles read");
    let read = events
        .read("shared", || fetch_value(&calls, 2, Duration::ZERO))
        .await
        .expect("events read");

    assert_eq!(read.status, CacheStatus::Miss);
    assert_eq!(*read.value, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
