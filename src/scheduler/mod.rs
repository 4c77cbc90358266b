//! The rate-limited scheduler: the integrator that owns the request
//! lifecycle.
//!
//! [`RequestScheduler::execute`] runs one request through, in order:
//! cache lookup, single-flight attach, breaker admission, batching (for
//! eligible opt-ins), limiter admission through a FIFO-within-priority
//! lane, producer invocation, and the retry loop — feeding latency and
//! outcomes into the breaker and stats along the way.
//!
//! Keyed work executes on a detached task completed through the flight
//! table, so a caller that stops waiting (cancel, deadline) never tears
//! down a producer other callers are attached to. Un-keyed work runs
//! inline in the caller's task and is cancelled by drop.

mod envelope;
mod queue;
mod stats;

pub use envelope::RequestSpec;
pub use stats::{EndpointStats, StatsSnapshot};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use envelope::{Lifecycle, RequestEnvelope};
use queue::AdmissionQueue;
use stats::StatsRegistry;

use crate::batch::{BatchExecutor, Batcher};
use crate::breaker::{AdmitDecision, BreakerSnapshot, CircuitBreaker};
use crate::cache::{ResponseCache, SingleFlightCache};
use crate::config::{ConfigUpdate, CoordinatorConfig, RateConfig};
use crate::limiter::{Admission, EndpointUsage, RateHints, RateLimiter};
use crate::telemetry;
use crate::types::{BatchPayload, Endpoint, Priority, Provider, ProviderResponse, RequestType};
use crate::{KvasirError, Result};

/// A provider call the scheduler can invoke once per attempt.
pub type Producer = Arc<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>> + Send + Sync,
>;

/// A provider batch call: payloads in arrival order in, per-item
/// outcomes in the same order out.
pub type BatchProducer = Arc<
    dyn Fn(Vec<BatchPayload>) -> Pin<Box<dyn Future<Output = Result<Vec<Result<ProviderResponse>>>> + Send>>
        + Send
        + Sync,
>;

struct Inner {
    config: ArcSwap<CoordinatorConfig>,
    limiter: RateLimiter,
    queue: AdmissionQueue,
    cache: SingleFlightCache,
    batcher: Arc<Batcher>,
    breakers: HashMap<Provider, CircuitBreaker>,
    rate_overrides: Mutex<HashMap<Endpoint, RateConfig>>,
    stats: StatsRegistry,
    root: CancellationToken,
    cleaning: AtomicBool,
}

/// The coordination core's scheduler. Cheap to clone; all clones share
/// one set of mechanisms.
#[derive(Clone)]
pub struct RequestScheduler {
    inner: Arc<Inner>,
}

impl RequestScheduler {
    pub fn new(config: CoordinatorConfig) -> Self {
        let breakers = [Provider::Taste, Provider::Llm]
            .into_iter()
            .map(|provider| (provider, CircuitBreaker::new(provider, &config.breaker)))
            .collect();
        let cache = SingleFlightCache::new(ResponseCache::new(&config.cache));
        Self {
            inner: Arc::new(Inner {
                config: ArcSwap::from_pointee(config),
                limiter: RateLimiter::new(),
                queue: AdmissionQueue::new(),
                cache,
                batcher: Arc::new(Batcher::new()),
                breakers,
                rate_overrides: Mutex::new(HashMap::new()),
                stats: StatsRegistry::new(),
                root: CancellationToken::new(),
                cleaning: AtomicBool::new(false),
            }),
        }
    }

    /// Run one request through the full coordination pipeline.
    ///
    /// The returned future completes exactly once: with the producer's
    /// value, a taxonomy error, `Timeout` when the total deadline
    /// elapses, or `Cancelled`/`Cleanup`. Dropping the future detaches
    /// the caller; keyed work already in flight continues for any other
    /// attached callers.
    pub async fn execute(&self, spec: RequestSpec, producer: Producer) -> Result<ProviderResponse> {
        let config = self.inner.config.load_full();
        if !config.enabled {
            // Identity pass-through: no admission, no caching, no stats.
            return producer().await;
        }
        if self.inner.cleaning.load(Ordering::SeqCst) {
            return Err(KvasirError::Cleanup);
        }

        let endpoint = spec.endpoint;
        self.inner.stats.record_submitted(endpoint);
        let deadline = spec.timeout.unwrap_or(config.default_timeout);

        let dispatched = self.dispatch(&config, spec, producer);
        let outcome = match tokio::time::timeout(deadline, dispatched).await {
            Ok(outcome) => outcome,
            Err(_) => Err(KvasirError::Timeout { deadline }),
        };

        match &outcome {
            Ok(_) => self.inner.stats.record_ok(endpoint),
            Err(KvasirError::Cancelled) | Err(KvasirError::Cleanup) => {
                // A cancelled caller gets its completion and nothing more.
            }
            Err(_) => self.inner.stats.record_err(endpoint),
        }
        outcome
    }

    async fn dispatch(
        &self,
        config: &Arc<CoordinatorConfig>,
        spec: RequestSpec,
        producer: Producer,
    ) -> Result<ProviderResponse> {
        let inner = &self.inner;
        let cancel = match &spec.cancel {
            Some(token) => token.clone(),
            None => inner.root.child_token(),
        };

        match spec.key {
            Some(key) => {
                let endpoint = spec.endpoint;
                let ttl = ResponseCache::ttl_for(&config.cache, endpoint);
                let pipeline_inner = Arc::clone(inner);
                let pipeline_config = Arc::clone(config);
                let detached = inner.root.child_token();
                let fut = inner.cache.get_or_compute(key, endpoint, ttl, move || {
                    Inner::pipeline(pipeline_inner, spec, producer, pipeline_config, detached)
                });
                tokio::select! {
                    outcome = fut => outcome,
                    err = Inner::interrupted(inner, &cancel) => Err(err),
                }
            }
            None => {
                Inner::pipeline(Arc::clone(inner), spec, producer, Arc::clone(config), cancel)
                    .await
            }
        }
    }

    /// Register the wire-level batch call for one (provider, type).
    /// The scheduler wraps it with breaker, limiter, and retry handling
    /// before handing it to the batcher.
    pub fn register_batch_producer(
        &self,
        provider: Provider,
        request_type: RequestType,
        wire: BatchProducer,
    ) {
        let weak = Arc::downgrade(&self.inner);
        let executor: BatchExecutor = Arc::new(move |payloads| {
            let wire = Arc::clone(&wire);
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(inner) => {
                        Inner::run_batch(inner, provider, request_type, payloads, wire).await
                    }
                    None => Err(KvasirError::Cleanup),
                }
            })
        });
        self.inner
            .batcher
            .register_executor(provider, request_type, executor);
    }

    /// Install an adapter's default rate budget for its endpoint.
    pub fn set_rate_budget(&self, endpoint: Endpoint, budget: RateConfig) {
        self.inner
            .rate_overrides
            .lock()
            .unwrap()
            .insert(endpoint, budget);
    }

    /// Feed provider rate-limit response headers into the limiter.
    pub fn note_rate_headers(&self, endpoint: Endpoint, hints: &RateHints) {
        self.inner.limiter.update_from_headers(endpoint, hints);
    }

    /// Atomically apply a partial configuration update. Takes effect
    /// for subsequent admissions.
    pub fn update_config(&self, update: ConfigUpdate) {
        self.inner
            .config
            .rcu(|current| Arc::new(current.updated(update.clone())));
        debug!("configuration updated");
    }

    pub fn current_config(&self) -> Arc<CoordinatorConfig> {
        self.inner.config.load_full()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    pub fn limiter_stats(&self) -> HashMap<Endpoint, EndpointUsage> {
        self.inner.limiter.stats()
    }

    pub fn breaker_snapshot(&self, provider: Provider) -> BreakerSnapshot {
        self.inner.breakers[&provider].snapshot()
    }

    /// Cancel all in-flight and queued work; their promises reject with
    /// `Cleanup`. Subsequent `execute` calls fail immediately.
    /// Idempotent.
    pub fn cleanup(&self) {
        if self.inner.cleaning.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("scheduler cleanup: cancelling in-flight and queued work");
        self.inner.root.cancel();
        let drained = self.inner.batcher.drain_all(KvasirError::Cleanup);
        if drained > 0 {
            debug!(drained, "failed pending batch items");
        }
        self.inner.cache.shutdown(KvasirError::Cleanup);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cleaning.load(Ordering::SeqCst)
    }
}

/// Attach attempt accounting to a terminal error.
///
/// Any failure that consumed more than one attempt — or waited out at
/// least one backoff — surfaces wrapped in `Exhausted`, so every
/// surfaced error reports its attempt count and cumulative wait (a
/// bare kind implies a first-attempt failure with no backoff spent).
/// Cancellation outcomes bypass this: the caller's promise completes
/// with the literal `Cancelled`/`Cleanup` kind.
fn attributed(err: KvasirError, attempts: u32, waited: Duration) -> KvasirError {
    if attempts > 1 || !waited.is_zero() {
        KvasirError::Exhausted {
            attempts,
            waited,
            last: Box::new(err),
        }
    } else {
        err
    }
}

impl Inner {
    /// The admission-and-retry pipeline for one request (steps 3–8 of
    /// the execution order; caching and single-flight happen upstream
    /// in `dispatch`).
    async fn pipeline(
        inner: Arc<Inner>,
        spec: RequestSpec,
        producer: Producer,
        config: Arc<CoordinatorConfig>,
        cancel: CancellationToken,
    ) -> Result<ProviderResponse> {
        let endpoint = spec.endpoint;
        let provider = endpoint.provider();
        let request_type = endpoint.request_type();
        let mut envelope = RequestEnvelope::new(spec, cancel);
        // Cloned so select! handlers can mutate the envelope while the
        // interruption future holds a token reference.
        let cancel = envelope.cancel.clone();

        // Batch path: an open breaker fails fast before enqueueing.
        if envelope.spec.batchable && config.batching.is_eligible(request_type) {
            if let Some(retry_in) = inner.breakers[&provider].currently_open() {
                envelope.transition(Lifecycle::Failed);
                return Err(KvasirError::BreakerOpen {
                    retry_in: Some(retry_in),
                });
            }
            let Some(payload) = envelope.spec.batch_payload.clone() else {
                return Err(KvasirError::Configuration(
                    "batchable request carries no batch payload".into(),
                ));
            };
            inner.stats.record_batched(endpoint);
            let (ticket, mut rx) =
                inner
                    .batcher
                    .enqueue(provider, request_type, payload, &config.batching);
            return tokio::select! {
                outcome = &mut rx => {
                    let outcome = outcome.unwrap_or(Err(KvasirError::Cleanup));
                    envelope.transition(match outcome {
                        Ok(_) => Lifecycle::Done,
                        Err(_) => Lifecycle::Failed,
                    });
                    outcome
                }
                err = Inner::interrupted(&inner, &cancel) => {
                    inner.batcher.cancel(&ticket);
                    envelope.transition(Lifecycle::Cancelled);
                    Err(err)
                }
            };
        }

        // Direct path.
        let max_attempts = envelope
            .spec
            .max_attempts
            .unwrap_or(config.backoff.max_attempts)
            .max(1);
        let mut waited = Duration::ZERO;
        let breaker = &inner.breakers[&provider];

        loop {
            // Re-checked every attempt: an Open circuit is never crossed,
            // even by a retry scheduled before it opened.
            let probe = match breaker.try_admit() {
                AdmitDecision::Allowed { probe } => probe,
                AdmitDecision::Rejected { retry_in } => {
                    envelope.transition(Lifecycle::Failed);
                    return Err(attributed(
                        KvasirError::BreakerOpen { retry_in },
                        envelope.attempt,
                        waited,
                    ));
                }
            };

            let queued_at = Instant::now();
            if let Err(err) =
                Inner::acquire(&inner, endpoint, envelope.spec.priority, &cancel).await
            {
                if probe {
                    breaker.abort_probe();
                }
                envelope.transition(Lifecycle::Cancelled);
                return Err(err);
            }
            envelope.transition(Lifecycle::Admitted);
            inner
                .stats
                .record_accepted(endpoint, 1, queued_at.elapsed());

            envelope.attempt += 1;
            envelope.transition(Lifecycle::Executing);
            let started = Instant::now();
            let outcome = tokio::select! {
                outcome = (producer)() => outcome,
                err = Inner::interrupted(&inner, &cancel) => {
                    if probe {
                        breaker.abort_probe();
                    }
                    envelope.transition(Lifecycle::Cancelled);
                    return Err(err);
                }
            };
            let elapsed = started.elapsed();
            metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
                "endpoint" => endpoint.as_str())
            .record(elapsed.as_secs_f64());

            match outcome {
                Ok(value) => {
                    breaker.record_success(&config.breaker);
                    metrics::counter!(telemetry::REQUESTS_TOTAL,
                        "endpoint" => endpoint.as_str(), "status" => "ok")
                    .increment(1);
                    envelope.transition(Lifecycle::Done);
                    return Ok(value);
                }
                Err(err) => {
                    metrics::counter!(telemetry::REQUESTS_TOTAL,
                        "endpoint" => endpoint.as_str(), "status" => "error")
                    .increment(1);
                    if err.is_breaker_failure() {
                        breaker.record_failure(&config.breaker);
                    } else if probe {
                        // Outcome says nothing about provider health;
                        // free the probe slot without a verdict.
                        breaker.abort_probe();
                    }

                    let may_retry =
                        err.is_retryable() && !probe && envelope.attempt < max_attempts;
                    if !may_retry {
                        envelope.transition(Lifecycle::Failed);
                        return Err(attributed(err, envelope.attempt, waited));
                    }

                    let delay = config.backoff.next_delay(envelope.attempt, err.retry_after());
                    inner.stats.record_backoff(endpoint);
                    metrics::counter!(telemetry::RETRIES_TOTAL,
                        "endpoint" => endpoint.as_str())
                    .increment(1);
                    warn!(
                        endpoint = endpoint.as_str(),
                        attempt = envelope.attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    envelope.transition(Lifecycle::RetryScheduled);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => waited += delay,
                        err = Inner::interrupted(&inner, &cancel) => {
                            envelope.transition(Lifecycle::Cancelled);
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    /// Admission through the FIFO lane: only the head of the queue may
    /// ask the limiter, so grants are FIFO within equal priority.
    async fn acquire(
        inner: &Arc<Inner>,
        endpoint: Endpoint,
        priority: Priority,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let waiter = inner.queue.join(endpoint, priority);
        let result = loop {
            if inner.queue.is_head(endpoint, &waiter) {
                let budget = inner.resolve_budget(endpoint);
                match inner.limiter.try_acquire(endpoint, &budget) {
                    Admission::Granted => break Ok(()),
                    Admission::WaitFor(wait) => {
                        metrics::counter!(telemetry::RATE_DEFERRALS_TOTAL,
                            "endpoint" => endpoint.as_str())
                        .increment(1);
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {}
                            err = Inner::interrupted(inner, cancel) => break Err(err),
                        }
                    }
                }
            } else {
                tokio::select! {
                    _ = waiter.notify.notified() => {}
                    err = Inner::interrupted(inner, cancel) => break Err(err),
                }
            }
        };
        inner.queue.leave(endpoint, &waiter);
        result
    }

    /// Run one closed batch: breaker and limiter admission, the wire
    /// call, and retries — one permit per wire call, not per item.
    async fn run_batch(
        inner: Arc<Inner>,
        provider: Provider,
        request_type: RequestType,
        payloads: Vec<BatchPayload>,
        wire: BatchProducer,
    ) -> Result<Vec<Result<ProviderResponse>>> {
        let endpoint = match (provider, request_type) {
            (Provider::Taste, RequestType::TasteEntities) => Endpoint::TasteEntities,
            (Provider::Llm, RequestType::LlmCompletion) => Endpoint::LlmComplete,
            (provider, request_type) => {
                return Err(KvasirError::Configuration(format!(
                    "no batch endpoint for {provider}/{request_type:?}"
                )));
            }
        };
        let config = inner.config.load_full();
        let breaker = &inner.breakers[&provider];
        let cancel = inner.root.child_token();
        let items = payloads.len() as u64;
        let max_attempts = config.backoff.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut waited = Duration::ZERO;

        loop {
            let probe = match breaker.try_admit() {
                AdmitDecision::Allowed { probe } => probe,
                AdmitDecision::Rejected { retry_in } => {
                    return Err(attributed(
                        KvasirError::BreakerOpen { retry_in },
                        attempts,
                        waited,
                    ));
                }
            };

            let queued_at = Instant::now();
            if let Err(err) = Inner::acquire(&inner, endpoint, Priority::Normal, &cancel).await {
                if probe {
                    breaker.abort_probe();
                }
                return Err(err);
            }
            inner
                .stats
                .record_accepted(endpoint, items, queued_at.elapsed());

            attempts += 1;
            let outcome = tokio::select! {
                outcome = wire(payloads.clone()) => outcome,
                err = Inner::interrupted(&inner, &cancel) => {
                    if probe {
                        breaker.abort_probe();
                    }
                    return Err(err);
                }
            };

            match outcome {
                Ok(results) => {
                    breaker.record_success(&config.breaker);
                    return Ok(results);
                }
                Err(err) => {
                    if err.is_breaker_failure() {
                        breaker.record_failure(&config.breaker);
                    } else if probe {
                        breaker.abort_probe();
                    }
                    let may_retry = err.is_retryable() && !probe && attempts < max_attempts;
                    if !may_retry {
                        return Err(attributed(err, attempts, waited));
                    }
                    let delay = config.backoff.next_delay(attempts, err.retry_after());
                    inner.stats.record_backoff(endpoint);
                    warn!(
                        endpoint = endpoint.as_str(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying batch after transient failure"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => waited += delay,
                        err = Inner::interrupted(&inner, &cancel) => return Err(err),
                    }
                }
            }
        }
    }

    /// Resolve the budget for an endpoint: adapter override, else the
    /// configured default.
    fn resolve_budget(&self, endpoint: Endpoint) -> RateConfig {
        self.rate_overrides
            .lock()
            .unwrap()
            .get(&endpoint)
            .cloned()
            .unwrap_or_else(|| self.config.load().rate.clone())
    }

    fn cancel_error(&self) -> KvasirError {
        if self.cleaning.load(Ordering::SeqCst) {
            KvasirError::Cleanup
        } else {
            KvasirError::Cancelled
        }
    }

    /// Resolves when either the request's own token or the scheduler
    /// root is cancelled, with the matching error kind.
    async fn interrupted(inner: &Arc<Inner>, cancel: &CancellationToken) -> KvasirError {
        tokio::select! {
            _ = cancel.cancelled() => inner.cancel_error(),
            _ = inner.root.cancelled() => KvasirError::Cleanup,
        }
    }
}
