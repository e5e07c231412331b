//! Cache configuration.
//!
//! `CacheConfig` holds the engine-wide switches; `CacheDomainConfig` holds the
//! freshness policy and capacity of a single domain.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;
const DEFAULT_COMPRESSION_THRESHOLD_BYTES: usize = 1024;

/// Engine-wide cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every read bypasses the cache and calls its fetcher directly.
    pub enabled: bool,
    /// How often the sweeper drops entries older than their stale bound.
    pub sweep_interval: Duration,
    /// Bodies smaller than this are always sent uncompressed.
    pub compression_threshold_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            compression_threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            sweep_interval: settings.sweep_interval,
            compression_threshold_bytes: settings.compression_threshold_bytes,
        }
    }
}

impl CacheConfig {
    /// Configuration with caching switched off; every read goes upstream.
    pub fn bypass() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Freshness tier of a cached entry, derived from its age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// `age <= ttl`: serve without touching upstream.
    Fresh,
    /// `ttl < age <= stale`: serve, and refresh in the background.
    Stale,
    /// `age > stale`: treat as missing.
    Expired,
}

/// Freshness policy and capacity of one cache domain.
///
/// Invariants: `stale >= ttl` and `max_entries >= 1`. The constructor repairs
/// violating input instead of rejecting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDomainConfig {
    ttl: Duration,
    stale: Duration,
    max_entries: NonZeroUsize,
}

impl CacheDomainConfig {
    /// Build a domain config. A `stale` window shorter than `ttl` falls back to
    /// `ttl`; a zero capacity is clamped to one.
    pub fn new(ttl: Duration, stale: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            stale: stale.max(ttl),
            max_entries: NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Millisecond convenience mirroring the `*_ms` configuration keys.
    pub fn from_millis(ttl_ms: u64, stale_ms: u64, max_entries: usize) -> Self {
        Self::new(
            Duration::from_millis(ttl_ms),
            Duration::from_millis(stale_ms),
            max_entries,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stale(&self) -> Duration {
        self.stale
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries.get()
    }

    /// Classify an entry of the given age. Both bounds are inclusive.
    pub fn classify(&self, age: Duration) -> Freshness {
        if age <= self.ttl {
            Freshness::Fresh
        } else if age <= self.stale {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.sweep_interval, Duration::from_secs(600));
        assert_eq!(config.compression_threshold_bytes, 1024);
    }

    #[test]
    fn bypass_disables_cache() {
        assert!(!CacheConfig::bypass().enabled);
    }

    #[test]
    fn stale_below_ttl_falls_back_to_ttl() {
        let config = CacheDomainConfig::from_millis(5_000, 1_000, 3);
        assert_eq!(config.stale(), Duration::from_millis(5_000));
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let config = CacheDomainConfig::from_millis(1_000, 5_000, 0);
        assert_eq!(config.max_entries(), 1);
    }

    #[test]
    fn classify_uses_inclusive_bounds() {
        let config = CacheDomainConfig::from_millis(1_000, 5_000, 3);
        assert_eq!(config.classify(Duration::from_millis(500)), Freshness::Fresh);
        assert_eq!(config.classify(Duration::from_millis(1_000)), Freshness::Fresh);
        assert_eq!(config.classify(Duration::from_millis(3_000)), Freshness::Stale);
        assert_eq!(config.classify(Duration::from_millis(5_000)), Freshness::Stale);
        assert_eq!(config.classify(Duration::from_millis(9_000)), Freshness::Expired);
    }

    #[test]
    fn zero_ttl_with_zero_stale_is_always_expired_after_any_age() {
        let config = CacheDomainConfig::from_millis(0, 0, 1);
        assert_eq!(config.classify(Duration::ZERO), Freshness::Fresh);
        assert_eq!(config.classify(Duration::from_millis(1)), Freshness::Expired);
    }
}
