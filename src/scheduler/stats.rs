//! Scheduler counters and their snapshot form.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::types::Endpoint;

#[derive(Debug, Default)]
struct EndpointCounters {
    requests: u64,
    ok: u64,
    err: u64,
    wait_micros: u64,
}

/// Live counters owned by the scheduler.
///
/// Submission, admission, and completion are counted separately:
/// `accepted` means a producer invocation was admitted (immediately or
/// after a limiter wait), which is why a deferred-then-granted request
/// still counts as accepted, not rejected.
#[derive(Debug, Default)]
pub(crate) struct StatsRegistry {
    total: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    backoff: AtomicU64,
    batched: AtomicU64,
    completed_ok: AtomicU64,
    completed_err: AtomicU64,
    wait_micros: AtomicU64,
    by_endpoint: Mutex<HashMap<Endpoint, EndpointCounters>>,
}

impl StatsRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_submitted(&self, endpoint: Endpoint) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let mut map = self.by_endpoint.lock().unwrap();
        map.entry(endpoint).or_default().requests += 1;
    }

    /// One producer admission (n > 1 for a closed batch).
    pub(crate) fn record_accepted(&self, endpoint: Endpoint, n: u64, waited: Duration) {
        self.accepted.fetch_add(n, Ordering::Relaxed);
        let micros = waited.as_micros() as u64;
        self.wait_micros.fetch_add(micros, Ordering::Relaxed);
        let mut map = self.by_endpoint.lock().unwrap();
        map.entry(endpoint).or_default().wait_micros += micros;
    }

    pub(crate) fn record_batched(&self, _endpoint: Endpoint) {
        self.batched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backoff(&self, _endpoint: Endpoint) {
        self.backoff.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ok(&self, endpoint: Endpoint) {
        self.completed_ok.fetch_add(1, Ordering::Relaxed);
        let mut map = self.by_endpoint.lock().unwrap();
        map.entry(endpoint).or_default().ok += 1;
    }

    pub(crate) fn record_err(&self, endpoint: Endpoint) {
        self.completed_err.fetch_add(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
        let mut map = self.by_endpoint.lock().unwrap();
        map.entry(endpoint).or_default().err += 1;
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        let accepted = self.accepted.load(Ordering::Relaxed);
        let ok = self.completed_ok.load(Ordering::Relaxed);
        let err = self.completed_err.load(Ordering::Relaxed);
        let completed = ok + err;
        let wait_micros = self.wait_micros.load(Ordering::Relaxed);

        let by_endpoint = self
            .by_endpoint
            .lock()
            .unwrap()
            .iter()
            .map(|(endpoint, counters)| {
                (
                    *endpoint,
                    EndpointStats {
                        requests: counters.requests,
                        succeeded: counters.ok,
                        failed: counters.err,
                        average_wait: average(counters.wait_micros, counters.ok + counters.err),
                    },
                )
            })
            .collect();

        StatsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            accepted_requests: accepted,
            rejected_requests: self.rejected.load(Ordering::Relaxed),
            backoff_count: self.backoff.load(Ordering::Relaxed),
            batched_requests: self.batched.load(Ordering::Relaxed),
            average_wait: average(wait_micros, accepted),
            success_rate: if completed > 0 {
                ok as f64 / completed as f64
            } else {
                1.0
            },
            by_endpoint,
        }
    }

    pub(crate) fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.accepted.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.backoff.store(0, Ordering::Relaxed);
        self.batched.store(0, Ordering::Relaxed);
        self.completed_ok.store(0, Ordering::Relaxed);
        self.completed_err.store(0, Ordering::Relaxed);
        self.wait_micros.store(0, Ordering::Relaxed);
        self.by_endpoint.lock().unwrap().clear();
    }
}

fn average(total_micros: u64, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_micros(total_micros / count)
    }
}

/// Point-in-time scheduler counters, serializable for the upstream
/// dashboard boundary.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub accepted_requests: u64,
    pub rejected_requests: u64,
    pub backoff_count: u64,
    pub batched_requests: u64,
    pub average_wait: Duration,
    pub success_rate: f64,
    pub by_endpoint: HashMap<Endpoint, EndpointStats>,
}

/// Per-endpoint slice of the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    pub requests: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub average_wait: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counts() {
        let stats = StatsRegistry::new();
        stats.record_submitted(Endpoint::TasteEntities);
        stats.record_submitted(Endpoint::TasteEntities);
        stats.record_accepted(Endpoint::TasteEntities, 2, Duration::from_millis(10));
        stats.record_ok(Endpoint::TasteEntities);
        stats.record_err(Endpoint::TasteEntities);
        stats.record_backoff(Endpoint::TasteEntities);

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.accepted_requests, 2);
        assert_eq!(snap.rejected_requests, 1);
        assert_eq!(snap.backoff_count, 1);
        assert!((snap.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(snap.by_endpoint[&Endpoint::TasteEntities].requests, 2);
    }

    #[test]
    fn reset_zeroes_everything() {
        let stats = StatsRegistry::new();
        stats.record_submitted(Endpoint::LlmComplete);
        stats.record_err(Endpoint::LlmComplete);
        stats.reset();

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.rejected_requests, 0);
        assert!(snap.by_endpoint.is_empty());
        assert!((snap.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_average_is_zero() {
        let stats = StatsRegistry::new();
        assert_eq!(stats.snapshot().average_wait, Duration::ZERO);
    }
}
