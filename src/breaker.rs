//! Per-provider circuit breaker.
//!
//! Closed → Open after `fail_threshold` consecutive failures inside
//! `fail_window`; Open → HalfOpen once the cooldown elapses; HalfOpen
//! admits exactly one probe, whose outcome either closes the circuit or
//! re-opens it with a doubled cooldown (capped at `max_cooldown`).
//!
//! All transitions are serialized behind one mutex per breaker, so any
//! request observes exactly one consistent state for its admission
//! check. Thresholds come in with each call, so configuration updates
//! apply to subsequent admissions without touching the state.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::BreakerConfig;
use crate::telemetry;
use crate::types::Provider;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow; consecutive failures are counted.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// One probe is allowed through to test recovery.
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    /// The call may proceed. `probe` is set when this is the single
    /// HalfOpen probe; its outcome MUST be reported back (or the probe
    /// aborted) so the slot frees up.
    Allowed { probe: bool },
    /// The circuit is open; `retry_in` is the time until the next
    /// HalfOpen transition, when known.
    Rejected { retry_in: Option<Duration> },
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    /// Cooldown that will apply (or is applying) to the Open state.
    pub current_cooldown: Duration,
    /// Remaining Open time, when Open.
    pub open_remaining: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    current_cooldown: Duration,
    probe_in_flight: bool,
}

/// Circuit breaker for one provider adapter.
pub struct CircuitBreaker {
    provider: Provider,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(provider: Provider, config: &BreakerConfig) -> Self {
        Self {
            provider,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                opened_at: None,
                current_cooldown: config.cooldown,
                probe_in_flight: false,
            }),
        }
    }

    /// Check whether a call may proceed right now.
    ///
    /// The cooldown consulted here is the one fixed when the circuit
    /// opened, so no configuration is needed at admission time.
    pub fn try_admit(&self) -> AdmitDecision {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => AdmitDecision::Allowed { probe: false },
            BreakerState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                let half_open_at = opened_at + inner.current_cooldown;
                if now >= half_open_at {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.probe_in_flight = true;
                    AdmitDecision::Allowed { probe: true }
                } else {
                    AdmitDecision::Rejected {
                        retry_in: Some(half_open_at - now),
                    }
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    AdmitDecision::Rejected { retry_in: None }
                } else {
                    inner.probe_in_flight = true;
                    AdmitDecision::Allowed { probe: true }
                }
            }
        }
    }

    /// Report a successful call.
    pub fn record_success(&self, config: &BreakerConfig) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.consecutive_failures = 0;
                inner.last_failure_at = None;
                inner.opened_at = None;
                inner.current_cooldown = config.cooldown;
                self.transition(&mut inner, BreakerState::Closed);
            }
            BreakerState::Open => {
                // A straggler from before the trip; nothing to do.
            }
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self, config: &BreakerConfig) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                let within_window = inner
                    .last_failure_at
                    .is_some_and(|at| now.duration_since(at) <= config.fail_window);
                inner.consecutive_failures = if within_window {
                    inner.consecutive_failures + 1
                } else {
                    1
                };
                inner.last_failure_at = Some(now);
                if inner.consecutive_failures >= config.fail_threshold {
                    inner.opened_at = Some(now);
                    inner.current_cooldown = config.cooldown;
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.last_failure_at = Some(now);
                inner.opened_at = Some(now);
                inner.current_cooldown =
                    (inner.current_cooldown * 2).min(config.max_cooldown);
                self.transition(&mut inner, BreakerState::Open);
            }
            BreakerState::Open => {
                inner.last_failure_at = Some(now);
            }
        }
    }

    /// Non-mutating peek: time remaining in the Open state, or `None`
    /// when the circuit would admit (or probe) right now. Used where a
    /// rejection must not consume the HalfOpen probe slot.
    pub fn currently_open(&self) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.lock().unwrap();
        match (inner.state, inner.opened_at) {
            (BreakerState::Open, Some(at)) => {
                let half_open_at = at + inner.current_cooldown;
                (now < half_open_at).then(|| half_open_at - now)
            }
            _ => None,
        }
    }

    /// Release the probe slot without recording an outcome (the probe
    /// caller was cancelled before its producer finished).
    pub fn abort_probe(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let inner = self.inner.lock().unwrap();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            current_cooldown: inner.current_cooldown,
            open_remaining: match (inner.state, inner.opened_at) {
                (BreakerState::Open, Some(at)) => Some(
                    (at + inner.current_cooldown).saturating_duration_since(now),
                ),
                _ => None,
            },
        }
    }

    fn transition(&self, inner: &mut BreakerInner, next: BreakerState) {
        if inner.state == next {
            return;
        }
        if next == BreakerState::Open {
            warn!(
                provider = self.provider.as_str(),
                cooldown_ms = inner.current_cooldown.as_millis() as u64,
                failures = inner.consecutive_failures,
                "circuit breaker opened"
            );
        } else {
            debug!(
                provider = self.provider.as_str(),
                from = inner.state.as_str(),
                to = next.as_str(),
                "circuit breaker transition"
            );
        }
        metrics::counter!(telemetry::BREAKER_TRANSITIONS_TOTAL,
            "provider" => self.provider.as_str(),
            "state" => next.as_str(),
        )
        .increment(1);
        inner.state = next;
    }
}
