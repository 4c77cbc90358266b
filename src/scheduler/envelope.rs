//! Request specifications and the envelopes that carry them.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::{BatchPayload, Endpoint, Priority, RequestKey};

/// Caller-facing options for one scheduled request.
#[derive(Clone)]
pub struct RequestSpec {
    pub endpoint: Endpoint,
    /// Fingerprint for caching and single-flight. Absent = the request
    /// is neither cached nor coalesced.
    pub key: Option<RequestKey>,
    pub priority: Priority,
    /// Caller opt-in to batching; only effective when the request type
    /// is configured as batch-eligible and a payload is supplied.
    pub batchable: bool,
    /// Wire payload handed to the batch executor when batched.
    pub batch_payload: Option<BatchPayload>,
    /// Total deadline across all attempts. Falls back to the configured
    /// default.
    pub timeout: Option<Duration>,
    /// Per-request override of the retry attempt cap.
    pub max_attempts: Option<u32>,
    /// External cancellation handle. One is derived from the
    /// scheduler's root token when absent.
    pub cancel: Option<CancellationToken>,
}

impl RequestSpec {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            key: None,
            priority: Priority::Normal,
            batchable: false,
            batch_payload: None,
            timeout: None,
            max_attempts: None,
            cancel: None,
        }
    }

    pub fn key(mut self, key: RequestKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn batchable(mut self, payload: BatchPayload) -> Self {
        self.batchable = true;
        self.batch_payload = Some(payload);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_attempts(mut self, cap: u32) -> Self {
        self.max_attempts = Some(cap);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Lifecycle of one in-flight request, traced for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Queued,
    Admitted,
    Executing,
    Done,
    RetryScheduled,
    Failed,
    Cancelled,
}

impl Lifecycle {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Admitted => "admitted",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::RetryScheduled => "retry_scheduled",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Runtime carrier for one in-flight request, owned by the scheduler.
pub(crate) struct RequestEnvelope {
    pub(crate) spec: RequestSpec,
    pub(crate) attempt: u32,
    pub(crate) enqueued_at: Instant,
    pub(crate) cancel: CancellationToken,
    state: Lifecycle,
}

impl RequestEnvelope {
    pub(crate) fn new(spec: RequestSpec, cancel: CancellationToken) -> Self {
        Self {
            spec,
            attempt: 0,
            enqueued_at: Instant::now(),
            cancel,
            state: Lifecycle::Queued,
        }
    }

    pub(crate) fn transition(&mut self, next: Lifecycle) {
        tracing::trace!(
            endpoint = self.spec.endpoint.as_str(),
            from = self.state.as_str(),
            to = next.as_str(),
            attempt = self.attempt,
            age_ms = self.enqueued_at.elapsed().as_millis() as u64,
            "request lifecycle"
        );
        self.state = next;
    }
}
