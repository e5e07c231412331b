//! Singleflight table.
//!
//! At most one fetch per key is in flight at a time. The fetch runs on its own
//! tokio task so it completes even when every caller that joined it has gone
//! away, and its slot is released before any joined caller sees the result.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

use super::error::FetchError;
use super::lock::mutex_lock;
use super::store::CacheEntry;

const SOURCE: &str = "cache::flight";

pub type FlightResult<T> = Result<CacheEntry<T>, FetchError>;

/// A pending fetch that any number of callers may await.
pub type Flight<T> = Shared<BoxFuture<'static, FlightResult<T>>>;

/// Outcome of [`InFlightTable::join_or_start`].
pub struct FlightHandle<T> {
    pub flight: Flight<T>,
    /// True when this call started the fetch, false when it joined one.
    pub started: bool,
}

pub struct InFlightTable<T> {
    flights: Mutex<HashMap<String, Flight<T>>>,
}

impl<T> Default for InFlightTable<T> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Send + Sync + 'static> InFlightTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight registered for `key`, or build one with `start` and
    /// register it. The lookup and the insert happen under one lock, so `start`
    /// runs at most once per key until that flight settles.
    pub fn join_or_start<S>(self: &Arc<Self>, key: &str, start: S) -> FlightHandle<T>
    where
        S: FnOnce() -> BoxFuture<'static, FlightResult<T>>,
    {
        let mut flights = mutex_lock(&self.flights, SOURCE, "join_or_start");
        if let Some(flight) = flights.get(key) {
            return FlightHandle {
                flight: flight.clone(),
                started: false,
            };
        }

        let work = start();
        let table = Arc::clone(self);
        let owned_key = key.to_string();
        let task = tokio::spawn(async move {
            let result = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(FetchError::Panicked {
                        detail: panic_message(panic.as_ref()),
                    })
                });
            table.remove(&owned_key);
            result
        });

        let flight: Flight<T> = async move {
            task.await.unwrap_or_else(|err| {
                Err(FetchError::Aborted {
                    detail: err.to_string(),
                })
            })
        }
        .boxed()
        .shared();

        flights.insert(key.to_string(), flight.clone());
        FlightHandle {
            flight,
            started: true,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        mutex_lock(&self.flights, SOURCE, "contains").contains_key(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.flights, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: &str) {
        mutex_lock(&self.flights, SOURCE, "remove").remove(key);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
