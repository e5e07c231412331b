//! Engine lifecycle and the periodic sweeper.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::config::{CacheConfig, CacheDomainConfig};
use super::domain::CacheDomain;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::engine";

/// Age-based cleanup hook implemented by every cache domain.
pub trait Sweep: Send + Sync {
    fn name(&self) -> &str;

    /// Remove entries older than the domain's stale bound. Returns how many
    /// entries were removed.
    fn sweep_expired(&self, now: Instant) -> usize;
}

/// Owns the cache domains of a process and the sweeper that ages them out.
///
/// ```ignore
/// let engine = CacheEngine::new(CacheConfig::default());
/// let tiles = engine.domain::<CachePayload>("tiles", CacheDomainConfig::from_millis(5_000, 30_000, 2));
/// engine.start();
/// // ...
/// engine.stop();
/// ```
pub struct CacheEngine {
    config: CacheConfig,
    domains: Arc<Mutex<Vec<Arc<dyn Sweep>>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheEngine {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            domains: Arc::new(Mutex::new(Vec::new())),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Create a domain bound to this engine. The engine's bypass flag applies
    /// to it and the sweeper will visit it.
    pub fn domain<T: Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        config: CacheDomainConfig,
    ) -> Arc<CacheDomain<T>> {
        let domain = Arc::new(CacheDomain::new(name, config, self.config.enabled));
        info!(
            domain = domain.name(),
            ttl_ms = config.ttl().as_millis() as u64,
            stale_ms = config.stale().as_millis() as u64,
            max_entries = config.max_entries(),
            enabled = self.config.enabled,
            "cache domain registered"
        );
        let sweepable: Arc<dyn Sweep> = domain.clone();
        mutex_lock(&self.domains, SOURCE, "domain").push(sweepable);
        domain
    }

    /// Start the periodic sweeper. Does nothing when caching is disabled or
    /// the sweeper is already running. Must be called within a tokio runtime.
    pub fn start(&self) {
        if !self.config.enabled {
            debug!("cache disabled; sweeper not started");
            return;
        }

        let mut sweeper = mutex_lock(&self.sweeper, SOURCE, "start");
        if sweeper.is_some() {
            return;
        }

        let domains = Arc::clone(&self.domains);
        let period = self.config.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                sweep_all(&domains);
            }
        }));

        info!(
            interval_secs = period.as_secs(),
            "cache sweeper started"
        );
    }

    /// Stop the sweeper if it is running.
    pub fn stop(&self) {
        if let Some(handle) = mutex_lock(&self.sweeper, SOURCE, "stop").take() {
            handle.abort();
            info!("cache sweeper stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        mutex_lock(&self.sweeper, SOURCE, "is_running").is_some()
    }

    /// Run one sweep pass over every domain now. Returns the number of
    /// entries removed.
    pub fn sweep_now(&self) -> usize {
        sweep_all(&self.domains)
    }
}

impl Drop for CacheEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sweep_all(domains: &Mutex<Vec<Arc<dyn Sweep>>>) -> usize {
    // Snapshot the list so a domain registered mid-sweep is not blocked.
    let domains: Vec<Arc<dyn Sweep>> = mutex_lock(domains, SOURCE, "sweep_all").clone();
    let now = Instant::now();

    let mut total = 0;
    for domain in &domains {
        let removed = domain.sweep_expired(now);
        if removed > 0 {
            debug!(domain = domain.name(), removed, "swept expired cache entries");
        }
        total += removed;
    }

    if total > 0 {
        info!(removed = total, "cleaned up expired cache entries");
    }
    total
}
