//! Cache domains and the stale-while-revalidate read path.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::config::{CacheDomainConfig, Freshness};
use super::engine::Sweep;
use super::error::FetchError;
use super::flight::{FlightHandle, InFlightTable};
use super::store::{CacheEntry, CacheStore};

pub const CACHE_HIT_TOTAL: &str = "staleguard_cache_hit_total";
pub const CACHE_STALE_TOTAL: &str = "staleguard_cache_stale_total";
pub const CACHE_MISS_TOTAL: &str = "staleguard_cache_miss_total";
pub const CACHE_EVICT_TOTAL: &str = "staleguard_cache_evict_total";
pub const CACHE_SWEEP_TOTAL: &str = "staleguard_cache_sweep_total";
pub const CACHE_REFRESH_FAILED_TOTAL: &str = "staleguard_cache_refresh_failed_total";
pub const CACHE_ENTRIES: &str = "staleguard_cache_entries";
pub const CACHE_FETCH_MS: &str = "staleguard_cache_fetch_ms";

/// Which freshness tier served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Stale,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Stale => "stale",
            Self::Miss => "miss",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`CacheDomain::read`].
#[derive(Debug)]
pub struct CacheRead<T> {
    pub value: Arc<T>,
    pub status: CacheStatus,
    pub fetched_at: Instant,
}

impl<T> CacheRead<T> {
    fn from_entry(entry: CacheEntry<T>, status: CacheStatus) -> Self {
        Self {
            value: Arc::clone(entry.value()),
            status,
            fetched_at: entry.fetched_at(),
        }
    }

    /// Age of the served value right now.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }
}

#[derive(Debug, Clone, Copy)]
enum FetchPath {
    Background,
    Cold,
}

impl FetchPath {
    fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Cold => "cold",
        }
    }
}

/// One named cache: a store and an in-flight table sharing a freshness policy.
///
/// Domains share nothing with each other; a process typically creates one per
/// upstream report through [`CacheEngine::domain`](super::CacheEngine::domain).
pub struct CacheDomain<T> {
    name: String,
    config: CacheDomainConfig,
    enabled: bool,
    store: Arc<CacheStore<T>>,
    in_flight: Arc<InFlightTable<T>>,
}

impl<T: Send + Sync + 'static> CacheDomain<T> {
    pub fn new(name: impl Into<String>, config: CacheDomainConfig, enabled: bool) -> Self {
        Self {
            name: name.into(),
            config,
            enabled,
            store: Arc::new(CacheStore::new()),
            in_flight: Arc::new(InFlightTable::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheDomainConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Read `key`, calling `fetcher` only when the cached entry is missing,
    /// stale or expired.
    ///
    /// - fresh: returns the cached value, no fetch.
    /// - stale: returns the cached value and starts one background refresh
    ///   unless a fetch for `key` is already in flight. A failed refresh is
    ///   logged and the stale value stays in place.
    /// - missing or expired: awaits a fetch, joining one already in flight.
    ///   Failures propagate and nothing is cached.
    ///
    /// With caching disabled every call awaits `fetcher` directly.
    pub async fn read<F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheRead<T>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        if !self.enabled {
            let value = fetcher().await?;
            self.record(CacheStatus::Miss, key, None);
            return Ok(CacheRead {
                value: Arc::new(value),
                status: CacheStatus::Miss,
                fetched_at: Instant::now(),
            });
        }

        if let Some(entry) = self.store.get(key) {
            let age = entry.age_at(Instant::now());
            match self.config.classify(age) {
                Freshness::Fresh => {
                    self.record(CacheStatus::Hit, key, Some(age));
                    return Ok(CacheRead::from_entry(entry, CacheStatus::Hit));
                }
                Freshness::Stale => {
                    let handle = self.join_or_start(key, fetcher, FetchPath::Background);
                    if handle.started {
                        debug!(domain = %self.name, key, "background refresh started");
                    }
                    self.record(CacheStatus::Stale, key, Some(age));
                    return Ok(CacheRead::from_entry(entry, CacheStatus::Stale));
                }
                Freshness::Expired => {
                    debug!(
                        domain = %self.name,
                        key,
                        age_ms = age.as_millis() as u64,
                        "cached entry past stale window"
                    );
                }
            }
        }

        let handle = self.join_or_start(key, fetcher, FetchPath::Cold);
        let entry = handle.flight.await?;
        self.record(CacheStatus::Miss, key, None);
        Ok(CacheRead::from_entry(entry, CacheStatus::Miss))
    }

    /// Snapshot the entry for `key` without affecting freshness or eviction.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<T>> {
        self.store.get(key)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn join_or_start<F, Fut>(&self, key: &str, fetcher: F, path: FetchPath) -> FlightHandle<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let domain = self.name.clone();
        let max_entries = self.config.max_entries();
        let owned_key = key.to_string();

        self.in_flight.join_or_start(key, move || {
            let fetch = fetcher();
            async move {
                let started_at = Instant::now();
                let result = fetch.await;
                histogram!(CACHE_FETCH_MS, "domain" => domain.clone())
                    .record(started_at.elapsed().as_secs_f64() * 1000.0);

                match result {
                    Ok(value) => {
                        let entry = store.insert(owned_key, value);
                        let evicted = store.evict_to(max_entries);
                        if !evicted.is_empty() {
                            counter!(CACHE_EVICT_TOTAL, "domain" => domain.clone())
                                .increment(evicted.len() as u64);
                            debug!(domain = %domain, evicted = ?evicted, "evicted oldest entries");
                        }
                        gauge!(CACHE_ENTRIES, "domain" => domain).set(store.len() as f64);
                        Ok(entry)
                    }
                    Err(err) => {
                        counter!(
                            CACHE_REFRESH_FAILED_TOTAL,
                            "domain" => domain.clone(),
                            "path" => path.as_str()
                        )
                        .increment(1);
                        match path {
                            FetchPath::Background => warn!(
                                domain = %domain,
                                key = %owned_key,
                                error = %err,
                                error_kind = err.kind(),
                                "background cache refresh failed; keeping stale entry"
                            ),
                            FetchPath::Cold => error!(
                                domain = %domain,
                                key = %owned_key,
                                error = %err,
                                error_kind = err.kind(),
                                "cache fetch failed"
                            ),
                        }
                        Err(err)
                    }
                }
            }
            .boxed()
        })
    }

    fn record(&self, status: CacheStatus, key: &str, age: Option<Duration>) {
        let metric = match status {
            CacheStatus::Hit => CACHE_HIT_TOTAL,
            CacheStatus::Stale => CACHE_STALE_TOTAL,
            CacheStatus::Miss => CACHE_MISS_TOTAL,
        };
        counter!(metric, "domain" => self.name.clone()).increment(1);
        debug!(
            domain = %self.name,
            key,
            status = status.as_str(),
            age_ms = age.map(|age| age.as_millis() as u64),
            "cache read"
        );
    }
}

impl<T: Send + Sync + 'static> Sweep for CacheDomain<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn sweep_expired(&self, now: Instant) -> usize {
        let removed = self.store.remove_older_than(self.config.stale(), now);
        if !removed.is_empty() {
            counter!(CACHE_SWEEP_TOTAL, "domain" => self.name.clone())
                .increment(removed.len() as u64);
            gauge!(CACHE_ENTRIES, "domain" => self.name.clone())
                .set(self.store.len() as f64);
        }
        removed.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn domain() -> CacheDomain<String> {
        CacheDomain::new("test", CacheDomainConfig::from_millis(1_000, 5_000, 3), true)
    }

    #[tokio::test(start_paused = true)]
    async fn first_read_is_a_miss_then_a_hit() {
        let domain = domain();
        let calls = AtomicUsize::new(0);

        let first = domain
            .read("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("v1".to_string()) }
            })
            .await
            .expect("cold read");
        assert_eq!(first.status, CacheStatus::Miss);

        let second = domain
            .read("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("v2".to_string()) }
            })
            .await
            .expect("warm read");
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.value.as_str(), "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_domain_always_fetches() {
        let domain: CacheDomain<u32> =
            CacheDomain::new("off", CacheDomainConfig::from_millis(60_000, 60_000, 3), false);

        for expected in [1_u32, 2] {
            let read = domain
                .read("k", move || async move { Ok(expected) })
                .await
                .expect("bypass read");
            assert_eq!(read.status, CacheStatus::Miss);
            assert_eq!(*read.value, expected);
        }
        assert!(domain.is_empty());
    }

    #[test]
    fn status_labels() {
        assert_eq!(CacheStatus::Hit.to_string(), "hit");
        assert_eq!(CacheStatus::Stale.to_string(), "stale");
        assert_eq!(CacheStatus::Miss.to_string(), "miss");
    }
}
