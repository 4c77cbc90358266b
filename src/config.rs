//! Coordinator configuration.
//!
//! Fixed configuration records with enumerated fields; deserialization
//! rejects unknown fields so a typoed option fails at load time instead
//! of silently defaulting. Every section has builder-style setters and a
//! `Default` with documented values.
//!
//! At runtime the whole [`CoordinatorConfig`] lives behind an
//! `arc_swap::ArcSwap`; [`ConfigUpdate`] replaces whole sections
//! atomically and takes effect for subsequent admissions.

use std::time::Duration;

use serde::Deserialize;

use crate::types::RequestType;

/// Per-endpoint rate budgets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateConfig {
    /// Admissions allowed per sliding minute. Default: 60.
    pub requests_per_minute: u32,
    /// Admissions allowed per sliding hour. Default: 1000.
    pub requests_per_hour: u32,
    /// Token-bucket burst capacity. Default: 10.
    pub burst: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1000,
            burst: 10,
        }
    }
}

impl RateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests_per_minute(mut self, n: u32) -> Self {
        self.requests_per_minute = n;
        self
    }

    pub fn requests_per_hour(mut self, n: u32) -> Self {
        self.requests_per_hour = n;
        self
    }

    pub fn burst(mut self, n: u32) -> Self {
        self.burst = n;
        self
    }
}

/// Retry engine parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackoffConfig {
    /// Delay before the first retry. Default: 500ms.
    pub base_delay: Duration,
    /// Cap on any single delay. Default: 30s.
    pub max_delay: Duration,
    /// Exponential growth factor. Default: 2.0.
    pub multiplier: f64,
    /// Maximum attempts including the initial request. 1 = no retry.
    /// Default: 3.
    pub max_attempts: u32,
    /// Multiply each delay by a uniform factor in [0.5, 1.5).
    /// Default: true.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 3,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn multiplier(mut self, factor: f64) -> Self {
        self.multiplier = factor;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }
}

/// Batcher parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BatchConfig {
    /// Size at which a batch closes immediately. Default: 5.
    pub max_batch_size: usize,
    /// Deadline after which a batch closes regardless of size.
    /// Default: 100ms.
    pub batch_delay: Duration,
    /// Request types that may be batched at all. A request still needs
    /// the caller's explicit opt-in. Default: Taste entity lookups.
    pub eligible_types: Vec<RequestType>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 5,
            batch_delay: Duration::from_millis(100),
            eligible_types: vec![RequestType::TasteEntities],
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n;
        self
    }

    pub fn batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn eligible_types(mut self, types: Vec<RequestType>) -> Self {
        self.eligible_types = types;
        self
    }

    pub fn is_eligible(&self, request_type: RequestType) -> bool {
        self.eligible_types.contains(&request_type)
    }
}

/// Circuit breaker parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker. Default: 5.
    pub fail_threshold: u32,
    /// Failures only count as consecutive when they land within this
    /// window of the previous one. Default: 60s.
    pub fail_window: Duration,
    /// Initial Open duration before a HalfOpen probe. Default: 30s.
    pub cooldown: Duration,
    /// Cooldown doubles on each failed probe, capped here. Default: 300s.
    pub max_cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            fail_threshold: 5,
            fail_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
        }
    }
}

impl BreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_threshold(mut self, n: u32) -> Self {
        self.fail_threshold = n;
        self
    }

    pub fn fail_window(mut self, window: Duration) -> Self {
        self.fail_window = window;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn max_cooldown(mut self, cap: Duration) -> Self {
        self.max_cooldown = cap;
        self
    }
}

/// Response cache parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// LRU byte budget across all entries. Default: 8 MiB.
    pub byte_budget: u64,
    /// TTL when no response-class TTL applies. Default: 1h.
    pub default_ttl: Duration,
    /// TTL for Taste entity responses. Default: 1h.
    pub taste_ttl: Duration,
    /// TTL for LLM completions. Default: 30min.
    pub llm_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            byte_budget: 8 * 1024 * 1024,
            default_ttl: Duration::from_secs(3600),
            taste_ttl: Duration::from_secs(3600),
            llm_ttl: Duration::from_secs(1800),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte_budget(mut self, bytes: u64) -> Self {
        self.byte_budget = bytes;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn taste_ttl(mut self, ttl: Duration) -> Self {
        self.taste_ttl = ttl;
        self
    }

    pub fn llm_ttl(mut self, ttl: Duration) -> Self {
        self.llm_ttl = ttl;
        self
    }
}

/// Health monitor parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HealthConfig {
    /// Time between probe rounds. Default: 5min.
    pub probe_interval: Duration,
    /// Probe latency above this is Degraded. Default: 1s.
    pub degraded_latency: Duration,
    /// Probe latency above this is Unhealthy. Default: 5s.
    pub unhealthy_latency: Duration,
    /// Number of recent probes the error rate is computed over.
    /// Default: 10.
    pub error_window: usize,
    /// Error rate (over the window) at or above which an endpoint is
    /// Degraded. Default: 0.3.
    pub degraded_error_rate: f64,
    /// Maximum retained history samples per endpoint. Default: 100.
    pub history_limit: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(300),
            degraded_latency: Duration::from_secs(1),
            unhealthy_latency: Duration::from_secs(5),
            error_window: 10,
            degraded_error_rate: 0.3,
            history_limit: 100,
        }
    }
}

impl HealthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn degraded_latency(mut self, latency: Duration) -> Self {
        self.degraded_latency = latency;
        self
    }

    pub fn unhealthy_latency(mut self, latency: Duration) -> Self {
        self.unhealthy_latency = latency;
        self
    }

    pub fn history_limit(mut self, n: usize) -> Self {
        self.history_limit = n;
        self
    }
}

/// The full coordinator configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CoordinatorConfig {
    /// Master switch. When false the scheduler becomes a pass-through:
    /// no limiting, batching, breaking, or caching — producers run
    /// directly. Default: true.
    pub enabled: bool,
    /// When false, a Taste category that fails hard fails the whole
    /// persona instead of degrading to fallback signals. Default: true.
    pub fallback_allowed: bool,
    /// Per-endpoint rate budgets (one default applied to every endpoint;
    /// adapters override per endpoint at registration).
    pub rate: RateConfig,
    pub backoff: BackoffConfig,
    pub batching: BatchConfig,
    pub breaker: BreakerConfig,
    pub cache: CacheConfig,
    pub health: HealthConfig,
    /// Total deadline applied when a caller does not supply one.
    /// Default: 30s.
    pub default_timeout: Duration,
    /// Minimum delay between consecutive persona orchestrations in one
    /// `generate` call. Default: 1s.
    pub persona_spacing: Duration,
    /// Minimum draft validation score. Default: 0.6.
    pub validation_threshold: f32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_allowed: true,
            rate: RateConfig::default(),
            backoff: BackoffConfig::default(),
            batching: BatchConfig::default(),
            breaker: BreakerConfig::default(),
            cache: CacheConfig::default(),
            health: HealthConfig::default(),
            default_timeout: Duration::from_secs(30),
            persona_spacing: Duration::from_secs(1),
            validation_threshold: crate::types::DEFAULT_VALIDATION_THRESHOLD,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn fallback_allowed(mut self, allowed: bool) -> Self {
        self.fallback_allowed = allowed;
        self
    }

    pub fn rate(mut self, rate: RateConfig) -> Self {
        self.rate = rate;
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn batching(mut self, batching: BatchConfig) -> Self {
        self.batching = batching;
        self
    }

    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn persona_spacing(mut self, spacing: Duration) -> Self {
        self.persona_spacing = spacing;
        self
    }

    pub fn validation_threshold(mut self, threshold: f32) -> Self {
        self.validation_threshold = threshold;
        self
    }

    /// Apply a partial update, returning the new config.
    pub fn updated(&self, update: ConfigUpdate) -> Self {
        let mut next = self.clone();
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }
        if let Some(fallback_allowed) = update.fallback_allowed {
            next.fallback_allowed = fallback_allowed;
        }
        if let Some(rate) = update.rate {
            next.rate = rate;
        }
        if let Some(backoff) = update.backoff {
            next.backoff = backoff;
        }
        if let Some(batching) = update.batching {
            next.batching = batching;
        }
        if let Some(breaker) = update.breaker {
            next.breaker = breaker;
        }
        if let Some(cache) = update.cache {
            next.cache = cache;
        }
        if let Some(health) = update.health {
            next.health = health;
        }
        if let Some(timeout) = update.default_timeout {
            next.default_timeout = timeout;
        }
        next
    }
}

/// Partial configuration update applied atomically by
/// [`update_config`](crate::PersonaGateway::update_config).
/// Absent sections keep their current values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigUpdate {
    pub enabled: Option<bool>,
    pub fallback_allowed: Option<bool>,
    pub rate: Option<RateConfig>,
    pub backoff: Option<BackoffConfig>,
    pub batching: Option<BatchConfig>,
    pub breaker: Option<BreakerConfig>,
    pub cache: Option<CacheConfig>,
    pub health: Option<HealthConfig>,
    pub default_timeout: Option<Duration>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn rate(mut self, rate: RateConfig) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn batching(mut self, batching: BatchConfig) -> Self {
        self.batching = Some(batching);
        self
    }

    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }
}
