//! Caching subsystem: keyed response store plus single-flight.
//!
//! Two cooperating parts:
//!
//! - [`ResponseCache`] — TTL- and byte-bounded store of provider
//!   responses, keyed by request fingerprint.
//! - [`flight::FlightTable`] — registry of in-flight producers giving
//!   the single-flight guarantee: concurrent requests for one key share
//!   one producer run and one outcome.
//!
//! [`SingleFlightCache`] composes them into the `get_or_compute`
//! operation the scheduler builds on.

pub(crate) mod flight;
pub mod response;

pub use response::ResponseCache;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use flight::{FlightSlot, FlightTable, await_outcome};

use crate::telemetry;
use crate::types::{Endpoint, ProviderResponse, RequestKey};
use crate::{KvasirError, Result};

/// Response store with the single-flight guarantee.
pub struct SingleFlightCache {
    store: Arc<ResponseCache>,
    flights: Arc<FlightTable>,
}

impl SingleFlightCache {
    pub fn new(store: ResponseCache) -> Self {
        Self {
            store: Arc::new(store),
            flights: Arc::new(FlightTable::new()),
        }
    }

    /// Plain lookup, no producer.
    pub async fn get(&self, key: RequestKey, endpoint: Endpoint) -> Option<ProviderResponse> {
        self.store.get(key, endpoint).await
    }

    /// Cached read-through with producer coalescing.
    ///
    /// On a hit, returns the stored value. Otherwise the first caller
    /// for `key` runs `produce` on a detached task — so a caller that
    /// stops waiting (cancellation, deadline) does not tear down work
    /// other attached callers share — and every caller observes the same
    /// outcome. The result is stored only on success and only when `ttl`
    /// is present.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: RequestKey,
        endpoint: Endpoint,
        ttl: Option<Duration>,
        produce: F,
    ) -> Result<ProviderResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProviderResponse>> + Send + 'static,
    {
        if let Some(hit) = self.store.get(key, endpoint).await {
            return Ok(hit);
        }

        match self.flights.try_join(key) {
            FlightSlot::Follower(rx) => {
                metrics::counter!(telemetry::FLIGHT_JOINS_TOTAL, "endpoint" => endpoint.as_str())
                    .increment(1);
                await_outcome(rx).await
            }
            FlightSlot::Leader(rx) => {
                let store = Arc::clone(&self.store);
                let flights = Arc::clone(&self.flights);
                let fut = produce();
                tokio::spawn(async move {
                    let outcome = fut.await;
                    if let (Ok(value), Some(ttl)) = (&outcome, ttl) {
                        store.insert(key, value.clone(), ttl).await;
                    }
                    flights.complete(key, outcome);
                });
                await_outcome(rx).await
            }
        }
    }

    /// Fail every in-flight producer's waiters and clear the store.
    pub fn shutdown(&self, error: KvasirError) {
        self.flights.fail_all(error);
        self.store.clear();
    }

    /// Keys currently in flight (diagnostics).
    pub fn inflight_len(&self) -> usize {
        self.flights.len()
    }
}
