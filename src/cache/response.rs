//! TTL- and byte-bounded response store.
//!
//! Backed by moka's async cache: LRU-flavoured eviction under a byte
//! budget (the weigher is the response's approximate heap footprint)
//! and per-entry TTL enforced exactly on read. TTLs are per response
//! class — Taste entities and LLM completions age differently, probes
//! are never cached.
//!
//! The single-flight guarantee lives next door in the flight table;
//! [`SingleFlightCache`](super::SingleFlightCache) composes the two.

use std::time::Duration;

use moka::Expiry;
use moka::future::Cache;

use crate::config::CacheConfig;
use crate::telemetry;
use crate::types::{Endpoint, ProviderResponse, RequestKey};

/// A stored response with its class-derived TTL.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) value: ProviderResponse,
    pub(crate) ttl: Duration,
}

/// Per-entry expiry: each entry carries its own TTL.
struct PerEntryTtl;

impl Expiry<RequestKey, CacheEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &RequestKey,
        entry: &CacheEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-memory response store under a byte budget.
pub struct ResponseCache {
    cache: Cache<RequestKey, CacheEntry>,
}

impl ResponseCache {
    /// Build a store from the cache section of the configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.byte_budget)
            .weigher(|_key, entry: &CacheEntry| {
                entry.value.approx_size().min(u32::MAX as usize) as u32
            })
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Look up a response. Expired entries are never returned.
    pub async fn get(&self, key: RequestKey, endpoint: Endpoint) -> Option<ProviderResponse> {
        match self.cache.get(&key).await {
            Some(entry) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "endpoint" => endpoint.as_str())
                    .increment(1);
                Some(entry.value)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "endpoint" => endpoint.as_str())
                    .increment(1);
                None
            }
        }
    }

    /// Store a response under `key` for `ttl`.
    pub async fn insert(&self, key: RequestKey, value: ProviderResponse, ttl: Duration) {
        self.cache.insert(key, CacheEntry { value, ttl }).await;
    }

    /// The TTL class for an endpoint's responses. `None` for endpoints
    /// whose responses are not cacheable at all.
    pub fn ttl_for(config: &CacheConfig, endpoint: Endpoint) -> Option<Duration> {
        match endpoint {
            Endpoint::TasteEntities => Some(config.taste_ttl),
            Endpoint::LlmComplete => Some(config.llm_ttl),
            Endpoint::TasteProbe | Endpoint::LlmProbe => None,
        }
    }

    /// Evict everything (cleanup path).
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Entries currently stored (approximate, per moka semantics).
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
