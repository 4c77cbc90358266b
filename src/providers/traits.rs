//! Provider seams the orchestrator depends on.
//!
//! The engine talks to trait objects rather than the concrete clients
//! so tests can substitute canned or failing providers without HTTP.
//! Adapters behind these traits are thin: they build wire messages and
//! thread everything through the scheduler — retrying is the
//! scheduler's job, never theirs.

use async_trait::async_trait;

use crate::Result;
use crate::types::{Entity, PersonaDraft, TasteQuery};

/// Source of cultural signals (the Taste adapter).
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Fetch the entities for one category query. `batch: true` opts
    /// the request into batching with other concurrent category
    /// queries (subject to configuration).
    async fn entities(&self, query: TasteQuery, batch: bool) -> Result<Vec<Entity>>;
}

/// Source of persona drafts (the LLM adapter).
#[async_trait]
pub trait DraftSource: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Complete `prompt` into a structured draft. Implementations own
    /// the single corrective re-prompt on parse failure; a second
    /// parse failure surfaces as `ParseInvalid`.
    async fn draft(&self, prompt: &str) -> Result<PersonaDraft>;
}
