//! Shared HTTP plumbing for the provider adapters: status-class error
//! mapping and rate-limit header parsing.
//!
//! Wall-clock time (`SystemTime`) is confined to this module — provider
//! reset headers arrive as unix epochs and are converted to durations
//! here, so everything downstream runs on `tokio::time`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;

use crate::KvasirError;
use crate::limiter::RateHints;

/// Map a non-success status into the error taxonomy.
///
/// 401/403 are credential problems, 429 is rate limiting (with any
/// `Retry-After` honoured), everything else is an upstream error whose
/// retryability the taxonomy decides from the status class.
pub(crate) fn classify_status(
    provider: &'static str,
    status: u16,
    message: String,
    retry_after: Option<Duration>,
) -> KvasirError {
    match status {
        401 => KvasirError::Authentication { provider },
        403 => KvasirError::Authorization { provider },
        429 => KvasirError::RateLimited { retry_after },
        _ => KvasirError::Upstream { status, message },
    }
}

/// Parse rate-limit hints from response headers.
///
/// Understood headers: `x-ratelimit-remaining`, `x-ratelimit-reset`
/// (unix seconds), and `retry-after` (delta seconds). Absent or
/// malformed headers simply yield `None` fields.
pub(crate) fn rate_hints(headers: &HeaderMap) -> RateHints {
    let remaining = header_u64(headers, "x-ratelimit-remaining");
    let reset_after = header_u64(headers, "x-ratelimit-reset").and_then(epoch_to_delta);
    let retry_after = header_u64(headers, "retry-after").map(Duration::from_secs);
    RateHints {
        remaining,
        reset_after,
        retry_after,
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Convert a unix-seconds reset epoch to a duration from now. A reset
/// in the past yields `None` — the window already rolled over.
fn epoch_to_delta(reset_epoch: u64) -> Option<Duration> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    (reset_epoch > now).then(|| Duration::from_secs(reset_epoch - now))
}
