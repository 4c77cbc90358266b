//! Per-endpoint admission control: sliding windows plus burst shaping.
//!
//! Two mechanisms compose. A sliding-window log per (endpoint, window)
//! gives the hard guarantee: a request is admitted only when the count
//! of grants inside the window is below the budget, for both the minute
//! and the hour window (the stricter applies). A token bucket refilling
//! at `budget / window` shapes short spikes up to its burst capacity.
//!
//! [`RateLimiter::try_acquire`] never blocks: it either grants or
//! reports the soonest instant admission can succeed, and the scheduler
//! owns the waiting (and the FIFO fairness of who re-acquires first).
//!
//! Provider response headers feed back through
//! [`update_from_headers`](RateLimiter::update_from_headers): when the
//! provider reports zero remaining quota, admission is forbidden until
//! the reported reset instant regardless of local counters.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateConfig;
use crate::types::Endpoint;

/// Outcome of a non-blocking admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; the grant has been recorded in every window.
    Granted,
    /// Not admissible yet; retry no sooner than this.
    WaitFor(Duration),
}

/// Rate-limit hints parsed from provider response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateHints {
    /// Requests the provider says remain in the current window.
    pub remaining: Option<u64>,
    /// Time until the provider's window resets.
    pub reset_after: Option<Duration>,
    /// Explicit `Retry-After` duration, if the provider sent one.
    pub retry_after: Option<Duration>,
}

/// Sliding log of grant timestamps for one window.
#[derive(Debug)]
struct SlidingWindow {
    window: Duration,
    grants: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(window: Duration) -> Self {
        Self {
            window,
            grants: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.grants.front() {
            if now.duration_since(oldest) >= self.window {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }

    fn has_room(&self, budget: u32) -> bool {
        (self.grants.len() as u32) < budget
    }

    /// Time until the oldest grant leaves the window, freeing a slot.
    /// Only meaningful when the window is full.
    fn earliest_slot(&self, now: Instant) -> Duration {
        match self.grants.front() {
            Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    fn record(&mut self, now: Instant) {
        self.grants.push_back(now);
    }

    fn in_window(&self) -> u32 {
        self.grants.len() as u32
    }
}

/// Token bucket refilled continuously at the steady budget rate.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant, rate_per_sec: f64, capacity: f64) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate_per_sec).min(capacity);
        self.last_refill = now;
    }

    fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    fn take(&mut self) {
        self.tokens -= 1.0;
    }

    fn time_until_token(&self, rate_per_sec: f64) -> Duration {
        if self.tokens >= 1.0 || rate_per_sec <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / rate_per_sec)
    }
}

#[derive(Debug)]
struct EndpointState {
    minute: SlidingWindow,
    hour: SlidingWindow,
    bucket: TokenBucket,
    /// Header-driven embargo: no admissions before this instant.
    forbid_until: Option<Instant>,
    header_update_at: Option<Instant>,
}

impl EndpointState {
    fn new(budget: &RateConfig, now: Instant) -> Self {
        Self {
            minute: SlidingWindow::new(Duration::from_secs(60)),
            hour: SlidingWindow::new(Duration::from_secs(3600)),
            bucket: TokenBucket::new(burst_capacity(budget), now),
            forbid_until: None,
            header_update_at: None,
        }
    }
}

fn burst_capacity(budget: &RateConfig) -> f64 {
    f64::from(budget.burst.max(1))
}

/// Point-in-time usage for one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointUsage {
    pub in_minute_window: u32,
    pub in_hour_window: u32,
    pub burst_tokens: f64,
    /// Remaining header-driven embargo, if any.
    pub forbidden_for: Option<Duration>,
    /// Time since the provider last told us anything via headers.
    pub header_update_age: Option<Duration>,
}

/// Admission decisions per provider endpoint.
pub struct RateLimiter {
    endpoints: Mutex<HashMap<Endpoint, EndpointState>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Non-blocking admission attempt against `budget`.
    ///
    /// On `Granted` the grant is recorded in both windows and a burst
    /// token is consumed. On `WaitFor(d)`, `d` is the largest of the
    /// constraints currently blocking admission, i.e. the soonest
    /// instant at which a retry can succeed if nothing else is admitted
    /// in between.
    pub fn try_acquire(&self, endpoint: Endpoint, budget: &RateConfig) -> Admission {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock().unwrap();
        let state = endpoints
            .entry(endpoint)
            .or_insert_with(|| EndpointState::new(budget, now));

        if let Some(until) = state.forbid_until {
            if now < until {
                return Admission::WaitFor(until - now);
            }
            state.forbid_until = None;
        }

        if budget.requests_per_minute == 0 || budget.requests_per_hour == 0 {
            // Zero budget: nothing can be admitted this window.
            return Admission::WaitFor(Duration::from_secs(60));
        }

        state.minute.prune(now);
        state.hour.prune(now);
        let rate_per_sec = f64::from(budget.requests_per_minute) / 60.0;
        state.bucket.refill(now, rate_per_sec, burst_capacity(budget));

        let mut wait = Duration::ZERO;
        if !state.minute.has_room(budget.requests_per_minute) {
            wait = wait.max(state.minute.earliest_slot(now));
        }
        if !state.hour.has_room(budget.requests_per_hour) {
            wait = wait.max(state.hour.earliest_slot(now));
        }
        if !state.bucket.has_token() {
            wait = wait.max(state.bucket.time_until_token(rate_per_sec));
        }

        if !wait.is_zero() {
            debug!(endpoint = %endpoint, wait_ms = wait.as_millis() as u64, "admission deferred");
            return Admission::WaitFor(wait);
        }

        state.minute.record(now);
        state.hour.record(now);
        state.bucket.take();
        Admission::Granted
    }

    /// Fold provider rate-limit headers into the admission state.
    ///
    /// When the provider reports zero remaining quota, admission to this
    /// endpoint is forbidden until the reset instant. The embargo only
    /// ever extends — a stale header cannot shorten one already in place.
    pub fn update_from_headers(&self, endpoint: Endpoint, hints: &RateHints) {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock().unwrap();
        let state = endpoints
            .entry(endpoint)
            .or_insert_with(|| EndpointState::new(&RateConfig::default(), now));
        state.header_update_at = Some(now);

        if hints.remaining == Some(0) {
            let embargo = hints.reset_after.or(hints.retry_after);
            if let Some(reset_after) = embargo {
                let until = now + reset_after;
                let extended = match state.forbid_until {
                    Some(existing) => existing.max(until),
                    None => until,
                };
                debug!(
                    endpoint = %endpoint,
                    forbid_ms = reset_after.as_millis() as u64,
                    "provider reports exhausted quota, forbidding admission"
                );
                state.forbid_until = Some(extended);
            }
        }
    }

    /// Snapshot of current usage per endpoint.
    pub fn stats(&self) -> HashMap<Endpoint, EndpointUsage> {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock().unwrap();
        endpoints
            .iter_mut()
            .map(|(endpoint, state)| {
                state.minute.prune(now);
                state.hour.prune(now);
                let usage = EndpointUsage {
                    in_minute_window: state.minute.in_window(),
                    in_hour_window: state.hour.in_window(),
                    burst_tokens: state.bucket.tokens,
                    forbidden_for: state
                        .forbid_until
                        .map(|until| until.saturating_duration_since(now))
                        .filter(|d| !d.is_zero()),
                    header_update_age: state
                        .header_update_at
                        .map(|at| now.saturating_duration_since(at)),
                };
                (*endpoint, usage)
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn budget(per_minute: u32, burst: u32) -> RateConfig {
        RateConfig::new()
            .requests_per_minute(per_minute)
            .requests_per_hour(per_minute * 60)
            .burst(burst)
    }

    #[tokio::test(start_paused = true)]
    async fn grants_up_to_budget_then_defers() {
        let limiter = RateLimiter::new();
        let budget = budget(5, 10);

        for _ in 0..5 {
            assert_eq!(
                limiter.try_acquire(Endpoint::TasteEntities, &budget),
                Admission::Granted
            );
        }
        match limiter.try_acquire(Endpoint::TasteEntities, &budget) {
            Admission::WaitFor(wait) => {
                assert!(wait > Duration::from_secs(59), "wait was {wait:?}");
                assert!(wait <= Duration::from_secs(60));
            }
            Admission::Granted => panic!("sixth acquisition should defer"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slot_frees_when_oldest_grant_expires() {
        let limiter = RateLimiter::new();
        let budget = budget(2, 10);

        assert_eq!(
            limiter.try_acquire(Endpoint::LlmComplete, &budget),
            Admission::Granted
        );
        advance(Duration::from_secs(30)).await;
        assert_eq!(
            limiter.try_acquire(Endpoint::LlmComplete, &budget),
            Admission::Granted
        );

        // Window full; the first grant expires in 30s.
        match limiter.try_acquire(Endpoint::LlmComplete, &budget) {
            Admission::WaitFor(wait) => {
                assert!(wait <= Duration::from_secs(30));
                assert!(wait > Duration::from_secs(29));
            }
            Admission::Granted => panic!("window should be full"),
        }

        advance(Duration::from_secs(31)).await;
        assert_eq!(
            limiter.try_acquire(Endpoint::LlmComplete, &budget),
            Admission::Granted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn burst_capacity_bounds_spikes() {
        let limiter = RateLimiter::new();
        // Large window budget, tiny burst: the bucket is the binding
        // constraint for back-to-back admissions.
        let budget = budget(60, 2);

        assert_eq!(
            limiter.try_acquire(Endpoint::TasteEntities, &budget),
            Admission::Granted
        );
        assert_eq!(
            limiter.try_acquire(Endpoint::TasteEntities, &budget),
            Admission::Granted
        );
        match limiter.try_acquire(Endpoint::TasteEntities, &budget) {
            Admission::WaitFor(wait) => {
                // Refill rate is 1/s, so one token is ~1s away.
                assert!(wait <= Duration::from_secs(1));
                assert!(!wait.is_zero());
            }
            Admission::Granted => panic!("bucket should be empty"),
        }

        advance(Duration::from_secs(1)).await;
        assert_eq!(
            limiter.try_acquire(Endpoint::TasteEntities, &budget),
            Admission::Granted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_header_forbids_until_reset() {
        let limiter = RateLimiter::new();
        let budget = budget(100, 100);

        limiter.update_from_headers(
            Endpoint::TasteEntities,
            &RateHints {
                remaining: Some(0),
                reset_after: Some(Duration::from_secs(42)),
                retry_after: None,
            },
        );

        match limiter.try_acquire(Endpoint::TasteEntities, &budget) {
            Admission::WaitFor(wait) => {
                assert!(wait <= Duration::from_secs(42));
                assert!(wait > Duration::from_secs(41));
            }
            Admission::Granted => panic!("embargo should hold"),
        }

        advance(Duration::from_secs(43)).await;
        assert_eq!(
            limiter.try_acquire(Endpoint::TasteEntities, &budget),
            Admission::Granted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn nonzero_remaining_does_not_forbid() {
        let limiter = RateLimiter::new();
        let budget = budget(10, 10);

        limiter.update_from_headers(
            Endpoint::LlmComplete,
            &RateHints {
                remaining: Some(3),
                reset_after: Some(Duration::from_secs(60)),
                retry_after: None,
            },
        );
        assert_eq!(
            limiter.try_acquire(Endpoint::LlmComplete, &budget),
            Admission::Granted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hour_window_is_the_stricter_bound() {
        let limiter = RateLimiter::new();
        let budget = RateConfig::new()
            .requests_per_minute(10)
            .requests_per_hour(2)
            .burst(10);

        assert_eq!(
            limiter.try_acquire(Endpoint::TasteEntities, &budget),
            Admission::Granted
        );
        assert_eq!(
            limiter.try_acquire(Endpoint::TasteEntities, &budget),
            Admission::Granted
        );
        match limiter.try_acquire(Endpoint::TasteEntities, &budget) {
            Admission::WaitFor(wait) => assert!(wait > Duration::from_secs(59 * 60)),
            Admission::Granted => panic!("hour budget exhausted"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stats_reflect_usage() {
        let limiter = RateLimiter::new();
        let budget = budget(10, 10);
        limiter.try_acquire(Endpoint::TasteEntities, &budget);
        limiter.try_acquire(Endpoint::TasteEntities, &budget);

        let stats = limiter.stats();
        let usage = &stats[&Endpoint::TasteEntities];
        assert_eq!(usage.in_minute_window, 2);
        assert_eq!(usage.in_hour_window, 2);
        assert!(usage.forbidden_for.is_none());
    }
}
