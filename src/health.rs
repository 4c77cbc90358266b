//! Health monitoring: periodic probes, aggregated status, and
//! recommendations.
//!
//! The monitor owns a background task that probes every registered
//! adapter on an interval. Status per endpoint is computed from probe
//! latency thresholds, the consecutive-failure run, and the error rate
//! over a sliding window of recent probes; the overall status is the
//! worst endpoint. A bounded history backs the latency percentiles.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::scheduler::RequestScheduler;
use crate::telemetry;
use crate::types::{Endpoint, Provider};
use crate::{KvasirError, Result};

/// A minimal-request health check one adapter exposes.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// The endpoint this probe exercises.
    fn endpoint(&self) -> Endpoint;

    /// One minimal round trip; `Ok` means the endpoint answered.
    async fn probe(&self) -> Result<()>;
}

/// Per-endpoint health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    /// No probe has completed yet.
    Unknown,
}

/// Probe failure classes, counted per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Auth,
    RateLimit,
    Timeout,
    Network,
    Upstream,
    Parse,
    Breaker,
    Other,
}

impl ErrorClass {
    fn of(error: &KvasirError) -> Self {
        match error {
            KvasirError::Authentication { .. } | KvasirError::Authorization { .. } => Self::Auth,
            KvasirError::RateLimited { .. } => Self::RateLimit,
            KvasirError::Timeout { .. } => Self::Timeout,
            KvasirError::Network(_) => Self::Network,
            KvasirError::Upstream { .. } => Self::Upstream,
            KvasirError::ParseInvalid(_) => Self::Parse,
            KvasirError::BreakerOpen { .. } => Self::Breaker,
            KvasirError::Exhausted { last, .. } => Self::of(last),
            _ => Self::Other,
        }
    }
}

/// Operator guidance derived from the fixed rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// Auth errors observed: the credential is likely wrong or revoked.
    CheckCredentials { provider: Provider },
    /// Rate-limit errors observed: back off or raise the quota.
    ReduceRequestRate { endpoint: Endpoint },
    /// Latency above the degraded threshold: investigate the provider.
    InvestigateLatency { endpoint: Endpoint },
    /// The circuit breaker is open; wait out the cooldown.
    AwaitBreakerCooldown { provider: Provider },
}

/// Health of a single endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    /// Error rate over the configured probe window.
    pub error_rate: f64,
    pub latency_p50: Duration,
    pub latency_p95: Duration,
    pub error_counts: BTreeMap<ErrorClass, u64>,
    pub samples: usize,
}

/// Aggregated view over all endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub overall: HealthStatus,
    pub endpoints: HashMap<Endpoint, EndpointHealth>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone)]
struct Sample {
    latency: Duration,
    error: Option<ErrorClass>,
}

struct MonitorInner {
    scheduler: RequestScheduler,
    probes: Vec<Arc<dyn HealthProbe>>,
    history: Mutex<HashMap<Endpoint, VecDeque<Sample>>>,
    stop: CancellationToken,
}

/// The periodic health monitor.
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(scheduler: RequestScheduler, probes: Vec<Arc<dyn HealthProbe>>) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                scheduler,
                probes,
                history: Mutex::new(HashMap::new()),
                stop: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the periodic probe task. Idempotent.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap();
        if task.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            loop {
                let interval = inner.scheduler.current_config().health.probe_interval;
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = inner.stop.cancelled() => break,
                }
                MonitorInner::run_round(&inner).await;
            }
        }));
    }

    /// Run one probe round immediately (also used by tests).
    pub async fn probe_now(&self) {
        MonitorInner::run_round(&self.inner).await;
    }

    /// Stop the probe task. Idempotent.
    pub fn stop(&self) {
        self.inner.stop.cancel();
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Compute the aggregated snapshot from recorded history and the
    /// current breaker states.
    pub fn snapshot(&self) -> HealthSnapshot {
        let config = self.inner.scheduler.current_config();
        let history = self.inner.history.lock().unwrap();

        let mut endpoints = HashMap::new();
        let mut recommendations = Vec::new();

        for probe in &self.inner.probes {
            let endpoint = probe.endpoint();
            let samples = history.get(&endpoint);
            let health = summarize(
                samples.map_or(&[][..], |deque| deque.as_slices().0),
                samples.map_or(&[][..], |deque| deque.as_slices().1),
                &config.health,
            );

            if health.error_counts.contains_key(&ErrorClass::Auth) {
                let rec = Recommendation::CheckCredentials {
                    provider: endpoint.provider(),
                };
                if !recommendations.contains(&rec) {
                    recommendations.push(rec);
                }
            }
            if health.error_counts.contains_key(&ErrorClass::RateLimit) {
                recommendations.push(Recommendation::ReduceRequestRate { endpoint });
            }
            if health.latency_p95 > config.health.degraded_latency && health.samples > 0 {
                recommendations.push(Recommendation::InvestigateLatency { endpoint });
            }

            endpoints.insert(endpoint, health);
        }

        for provider in [Provider::Taste, Provider::Llm] {
            let snapshot = self.inner.scheduler.breaker_snapshot(provider);
            if snapshot.open_remaining.is_some() {
                recommendations.push(Recommendation::AwaitBreakerCooldown { provider });
            }
        }

        // Worst known status wins; Unknown only when nothing has been
        // probed at all.
        let overall = endpoints
            .values()
            .map(|health| health.status)
            .filter(|status| *status != HealthStatus::Unknown)
            .max()
            .unwrap_or(HealthStatus::Unknown);

        HealthSnapshot {
            overall,
            endpoints,
            recommendations,
        }
    }
}

impl MonitorInner {
    async fn run_round(inner: &Arc<MonitorInner>) {
        let config = inner.scheduler.current_config();
        let results = futures_util::future::join_all(inner.probes.iter().map(|probe| {
            let probe = Arc::clone(probe);
            async move {
                let started = tokio::time::Instant::now();
                let outcome = probe.probe().await;
                (probe.endpoint(), started.elapsed(), outcome)
            }
        }))
        .await;

        let mut history = inner.history.lock().unwrap();
        for (endpoint, latency, outcome) in results {
            let status_label = if outcome.is_ok() { "ok" } else { "error" };
            metrics::counter!(telemetry::HEALTH_PROBES_TOTAL,
                "endpoint" => endpoint.as_str(), "status" => status_label)
            .increment(1);
            debug!(
                endpoint = endpoint.as_str(),
                latency_ms = latency.as_millis() as u64,
                ok = outcome.is_ok(),
                "health probe"
            );
            let deque = history.entry(endpoint).or_default();
            deque.push_back(Sample {
                latency,
                error: outcome.err().map(|e| ErrorClass::of(&e)),
            });
            while deque.len() > config.health.history_limit.max(1) {
                deque.pop_front();
            }
        }
    }
}

/// Reduce a sample history (as the two halves of a ring buffer) into an
/// [`EndpointHealth`].
fn summarize(front: &[Sample], back: &[Sample], config: &crate::config::HealthConfig) -> EndpointHealth {
    let samples: Vec<&Sample> = front.iter().chain(back.iter()).collect();
    if samples.is_empty() {
        return EndpointHealth {
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
            error_rate: 0.0,
            latency_p50: Duration::ZERO,
            latency_p95: Duration::ZERO,
            error_counts: BTreeMap::new(),
            samples: 0,
        };
    }

    let mut consecutive_failures = 0u32;
    for sample in samples.iter().rev() {
        if sample.error.is_some() {
            consecutive_failures += 1;
        } else {
            break;
        }
    }

    let window: Vec<&&Sample> = samples
        .iter()
        .rev()
        .take(config.error_window.max(1))
        .collect();
    let errors_in_window = window.iter().filter(|s| s.error.is_some()).count();
    let error_rate = errors_in_window as f64 / window.len() as f64;

    let mut error_counts = BTreeMap::new();
    for sample in &samples {
        if let Some(class) = sample.error {
            *error_counts.entry(class).or_insert(0u64) += 1;
        }
    }

    let mut latencies: Vec<Duration> = samples.iter().map(|s| s.latency).collect();
    latencies.sort();
    let latency_p50 = percentile(&latencies, 0.50);
    let latency_p95 = percentile(&latencies, 0.95);

    let status = if consecutive_failures >= 3 || latency_p95 > config.unhealthy_latency {
        HealthStatus::Unhealthy
    } else if error_rate >= config.degraded_error_rate || latency_p95 > config.degraded_latency {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    EndpointHealth {
        status,
        consecutive_failures,
        error_rate,
        latency_p50,
        latency_p95,
        error_counts,
        samples: samples.len(),
    }
}

fn percentile(sorted: &[Duration], q: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((sorted.len() as f64 - 1.0) * q).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
