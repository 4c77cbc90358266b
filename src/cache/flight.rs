//! In-flight request coalescing (single-flight).
//!
//! One broadcast channel per active [`RequestKey`]: the first caller to
//! register becomes the leader and runs the producer; everyone else
//! subscribes and receives a clone of the leader's outcome — success or
//! failure. The entry is removed when the outcome is published, so the
//! next request for the key starts a fresh flight.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::types::{ProviderResponse, RequestKey};
use crate::{KvasirError, Result};

type Outcome = Result<ProviderResponse>;

/// Role assigned to a caller for one key.
pub(crate) enum FlightSlot {
    /// This caller must run the producer and publish through
    /// [`FlightTable::complete`]. It observes the outcome on its own
    /// receiver like any follower.
    Leader(broadcast::Receiver<Outcome>),
    /// Another caller is already producing; await its outcome.
    Follower(broadcast::Receiver<Outcome>),
}

/// Registry of in-flight producers, keyed by fingerprint.
///
/// Invariant: at most one leader per key at any instant. The map entry
/// lives exactly as long as the flight; `complete` both removes it and
/// publishes, so attach-then-publish races resolve to either joining
/// this flight or starting the next one — never to a lost caller.
pub(crate) struct FlightTable {
    inflight: Mutex<HashMap<RequestKey, broadcast::Sender<Outcome>>>,
}

impl FlightTable {
    pub(crate) fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Join the flight for `key`, becoming leader if none is active.
    pub(crate) fn try_join(&self, key: RequestKey) -> FlightSlot {
        let mut inflight = self.inflight.lock().unwrap();
        if let Some(sender) = inflight.get(&key) {
            FlightSlot::Follower(sender.subscribe())
        } else {
            // Capacity 1: exactly one outcome is ever sent.
            let (tx, rx) = broadcast::channel(1);
            inflight.insert(key, tx);
            FlightSlot::Leader(rx)
        }
    }

    /// Publish the outcome for `key` to every attached caller and end
    /// the flight.
    pub(crate) fn complete(&self, key: RequestKey, outcome: Outcome) {
        let sender = self.inflight.lock().unwrap().remove(&key);
        if let Some(sender) = sender {
            // Send fails only when every caller stopped listening.
            let _ = sender.send(outcome);
        }
    }

    /// Fail every active flight with `error` (cleanup path).
    pub(crate) fn fail_all(&self, error: KvasirError) {
        let drained: Vec<_> = {
            let mut inflight = self.inflight.lock().unwrap();
            inflight.drain().collect()
        };
        for (_, sender) in drained {
            let _ = sender.send(Err(error.clone()));
        }
    }

    /// Number of keys currently in flight.
    pub(crate) fn len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }
}

/// Await an outcome from a flight receiver.
///
/// A closed channel means the leader's task was torn down without
/// publishing, which only cleanup does.
pub(crate) async fn await_outcome(mut rx: broadcast::Receiver<Outcome>) -> Outcome {
    match rx.recv().await {
        Ok(outcome) => outcome,
        Err(_) => Err(KvasirError::Cleanup),
    }
}
