//! Core PersonaGateway trait

use async_trait::async_trait;

use crate::Result;
use crate::config::ConfigUpdate;
use crate::health::HealthSnapshot;
use crate::scheduler::StatsSnapshot;
use crate::types::{Brief, PersonaResult};

/// The caller-facing surface of the coordination core.
///
/// Upstream code (HTTP layer, CLI, tests) depends on this trait rather
/// than the concrete engine, so the whole core can be mocked at one
/// seam.
#[async_trait]
pub trait PersonaGateway: Send + Sync {
    /// Generate `brief.count()` personas, each through the full
    /// Taste → LLM pipeline. Fails on the first persona that cannot be
    /// produced.
    async fn generate(&self, brief: Brief) -> Result<Vec<PersonaResult>>;

    /// Aggregated provider health, computed from recorded probe
    /// history and current breaker states.
    fn health_snapshot(&self) -> HealthSnapshot;

    /// Atomically apply a partial configuration update; takes effect
    /// for subsequent admissions.
    fn update_config(&self, update: ConfigUpdate);

    /// Scheduler counters.
    fn stats(&self) -> StatsSnapshot;

    /// Zero the scheduler counters.
    fn reset_stats(&self);

    /// Cancel all in-flight and queued work (their promises reject
    /// with `Cleanup`), stop the health monitor, and refuse new work.
    /// Idempotent.
    async fn cleanup(&self);
}
