//! Kvasir error types

use std::time::Duration;

/// Kvasir error types.
///
/// A closed taxonomy: every failure the core can surface is one of these
/// kinds, and the retry engine consults [`is_retryable()`](Self::is_retryable)
/// at each propagation boundary. The enum is `Clone` so one outcome can be
/// fanned out to every caller attached to a single-flight key or batch.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum KvasirError {
    /// A brief (or other caller input) violates its constraints. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The provider rejected our credential (401).
    #[error("authentication failed for provider '{provider}'")]
    Authentication { provider: &'static str },

    /// The credential is valid but not permitted for this operation (403).
    #[error("authorization denied for provider '{provider}'")]
    Authorization { provider: &'static str },

    /// Rate limited by the provider (429).
    ///
    /// `retry_after` is populated when the provider sent a `Retry-After`
    /// header; the retry engine treats it as a floor on the next delay and
    /// the limiter is updated from the accompanying reset hint.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// The caller's total deadline elapsed. The deadline is a sum budget
    /// across all attempts, so this is never retried.
    #[error("deadline of {deadline:?} elapsed")]
    Timeout { deadline: Duration },

    /// Transient I/O failure (connect, reset, per-attempt read timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Provider returned a non-success status not covered by a more
    /// specific kind. Retryable for 5xx and 408.
    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// The provider responded 2xx but the body did not parse into the
    /// expected structure. The LLM adapter re-prompts once with a correction
    /// hint; after that this is fatal. Never retried by the generic engine.
    #[error("unparseable response: {0}")]
    ParseInvalid(String),

    /// Refused locally because the provider's circuit breaker is open.
    /// Never retried within the same invocation.
    #[error("circuit breaker open, next probe in {retry_in:?}")]
    BreakerOpen { retry_in: Option<Duration> },

    /// The caller cancelled this request.
    #[error("request cancelled")]
    Cancelled,

    /// The coordinator was shut down while this request was pending.
    #[error("coordinator cleanup in progress")]
    Cleanup,

    /// The persona draft failed domain validation. The orchestrator retries
    /// exactly once with a corrective prompt; never retried here.
    #[error("draft validation scored {score:.2}, below threshold {threshold:.2}")]
    ValidationFailed { score: f32, threshold: f32 },

    /// Construction- or update-time configuration problem.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// More than one attempt was consumed before the request failed —
    /// the retry cap was reached, or a later attempt failed
    /// permanently. Wraps the final underlying error and carries the
    /// attempt count and cumulative backoff wait; single-attempt
    /// failures surface as the bare kind and report those fields
    /// through [`attempts()`](Self::attempts) / [`waited()`](Self::waited).
    #[error("gave up after {attempts} attempts ({waited:?} waiting): {last}")]
    Exhausted {
        attempts: u32,
        waited: Duration,
        last: Box<KvasirError>,
    },
}

impl KvasirError {
    /// Whether the generic retry engine may re-attempt after this error.
    ///
    /// Only rate-limit responses, network failures, and retryable upstream
    /// statuses (5xx, 408) qualify. `ParseInvalid` and `ValidationFailed`
    /// have their own single corrective retry owned by the adapter and
    /// orchestrator respectively, so they are permanent here.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Network(_) => true,
            Self::Upstream { status, .. } => *status >= 500 || *status == 408,

            Self::InvalidInput(_)
            | Self::Authentication { .. }
            | Self::Authorization { .. }
            | Self::Timeout { .. }
            | Self::ParseInvalid(_)
            | Self::BreakerOpen { .. }
            | Self::Cancelled
            | Self::Cleanup
            | Self::ValidationFailed { .. }
            | Self::Configuration(_)
            | Self::Exhausted { .. } => false,
        }
    }

    /// Whether this outcome counts against the provider's circuit breaker.
    ///
    /// Rate limiting is flow control, not provider sickness, and locally
    /// originated failures (cancellation, breaker rejection, bad input)
    /// say nothing about the provider either.
    pub fn is_breaker_failure(&self) -> bool {
        match self {
            Self::Authentication { .. }
            | Self::Authorization { .. }
            | Self::Network(_)
            | Self::Upstream { .. }
            | Self::ParseInvalid(_) => true,

            Self::InvalidInput(_)
            | Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::BreakerOpen { .. }
            | Self::Cancelled
            | Self::Cleanup
            | Self::ValidationFailed { .. }
            | Self::Configuration(_)
            | Self::Exhausted { .. } => false,
        }
    }

    /// Producer attempts consumed before this error surfaced.
    ///
    /// Every surfaced error reports this: the scheduler wraps any
    /// failure that consumed more than one attempt in `Exhausted`, so
    /// a bare kind means the first attempt was terminal (or no attempt
    /// ran at all, e.g. a breaker rejection at admission).
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    /// Cumulative backoff wait spent before this error surfaced.
    ///
    /// Zero for anything that failed without a scheduled retry in
    /// between; the real sum for multi-attempt failures.
    pub fn waited(&self) -> Duration {
        match self {
            Self::Exhausted { waited, .. } => *waited,
            _ => Duration::ZERO,
        }
    }

    /// For `RateLimited`, the duration the provider suggests waiting.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::Exhausted { last, .. } => last.retry_after(),
            _ => None,
        }
    }

    /// The original provider status code, where one exists.
    pub fn provider_status(&self) -> Option<u16> {
        match self {
            Self::Authentication { .. } => Some(401),
            Self::Authorization { .. } => Some(403),
            Self::RateLimited { .. } => Some(429),
            Self::Upstream { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.provider_status(),
            _ => None,
        }
    }

    /// A short remediation hint for operators, per error kind.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "fix the brief before resubmitting",
            Self::Authentication { .. } | Self::Authorization { .. } => {
                "check the provider credentials"
            }
            Self::RateLimited { .. } => "reduce request rate or raise the provider quota",
            Self::Timeout { .. } => "raise the request deadline or check provider latency",
            Self::Network(_) => "check connectivity to the provider",
            Self::Upstream { .. } => "provider-side failure; retry later",
            Self::ParseInvalid(_) => "inspect the provider response format",
            Self::BreakerOpen { .. } => "wait for the cooldown or check provider health",
            Self::Cancelled | Self::Cleanup => "caller-initiated; no action",
            Self::ValidationFailed { .. } => "review the prompt template and threshold",
            Self::Configuration(_) => "fix the configuration and rebuild the coordinator",
            Self::Exhausted { last, .. } => last.remediation(),
        }
    }
}

impl From<serde_json::Error> for KvasirError {
    fn from(err: serde_json::Error) -> Self {
        KvasirError::ParseInvalid(err.to_string())
    }
}

impl From<reqwest::Error> for KvasirError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest's own timeout is a per-attempt I/O failure, not the
        // caller's total deadline.
        KvasirError::Network(err.to_string())
    }
}

/// Result type alias for Kvasir operations
pub type Result<T> = std::result::Result<T, KvasirError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_retryable() {
        let err = KvasirError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn upstream_5xx_retryable_4xx_not() {
        let five = KvasirError::Upstream {
            status: 503,
            message: "unavailable".into(),
        };
        let four = KvasirError::Upstream {
            status: 404,
            message: "not found".into(),
        };
        let request_timeout = KvasirError::Upstream {
            status: 408,
            message: "request timeout".into(),
        };
        assert!(five.is_retryable());
        assert!(!four.is_retryable());
        assert!(request_timeout.is_retryable());
    }

    #[test]
    fn corrective_paths_are_not_engine_retryable() {
        assert!(!KvasirError::ParseInvalid("garbled".into()).is_retryable());
        assert!(
            !KvasirError::ValidationFailed {
                score: 0.2,
                threshold: 0.6
            }
            .is_retryable()
        );
    }

    #[test]
    fn rate_limited_does_not_feed_breaker() {
        assert!(!KvasirError::RateLimited { retry_after: None }.is_breaker_failure());
        assert!(KvasirError::Authentication { provider: "taste" }.is_breaker_failure());
    }

    #[test]
    fn every_error_reports_attempts_and_wait() {
        // Bare kinds mean the first attempt was terminal.
        let bare = KvasirError::Authentication { provider: "llm" };
        assert_eq!(bare.attempts(), 1);
        assert_eq!(bare.waited(), Duration::ZERO);

        let wrapped = KvasirError::Exhausted {
            attempts: 4,
            waited: Duration::from_millis(700),
            last: Box::new(KvasirError::Network("reset".into())),
        };
        assert_eq!(wrapped.attempts(), 4);
        assert_eq!(wrapped.waited(), Duration::from_millis(700));
    }

    #[test]
    fn exhausted_delegates_to_last() {
        let err = KvasirError::Exhausted {
            attempts: 3,
            waited: Duration::from_millis(300),
            last: Box::new(KvasirError::Upstream {
                status: 502,
                message: "bad gateway".into(),
            }),
        };
        assert_eq!(err.provider_status(), Some(502));
        assert!(!err.is_retryable());
    }
}
