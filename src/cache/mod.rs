//! Stale-while-revalidate cache engine.
//!
//! Each [`CacheDomain`] owns a keyed store, a singleflight table and its own
//! freshness policy. The [`CacheEngine`] registers domains and runs the
//! periodic sweep that drops entries past their stale window.

mod config;
mod domain;
mod engine;
mod error;
mod flight;
mod lock;
mod store;

pub mod codec;

pub use codec::{CachePayload, Encoding, ResponseCodec, append_vary, negotiate};
pub use config::{CacheConfig, CacheDomainConfig, Freshness};
pub use domain::{
    CACHE_ENTRIES, CACHE_EVICT_TOTAL, CACHE_FETCH_MS, CACHE_HIT_TOTAL, CACHE_MISS_TOTAL,
    CACHE_REFRESH_FAILED_TOTAL, CACHE_STALE_TOTAL, CACHE_SWEEP_TOTAL, CacheDomain, CacheRead,
    CacheStatus,
};
pub use engine::{CacheEngine, Sweep};
pub use error::FetchError;
pub use flight::{Flight, FlightHandle, FlightResult, InFlightTable};
pub use store::{CacheEntry, CacheStore};
