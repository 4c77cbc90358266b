//! The enrichment orchestrator: one brief through the Taste → LLM
//! pipeline.
//!
//! Per persona: fetch every required category in parallel (degrading
//! failed or empty categories to fallback signals when allowed),
//! compose the prompt, draft through the LLM with one corrective
//! retry on validation failure, then merge, dedup, and cap before
//! returning with generation metadata.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::fallback;
use super::prompt;
use crate::config::ConfigUpdate;
use crate::health::{HealthMonitor, HealthSnapshot};
use crate::providers::{DraftSource, SignalSource};
use crate::scheduler::{RequestScheduler, StatsSnapshot};
use crate::telemetry;
use crate::traits::PersonaGateway;
use crate::types::{
    Brief, Category, CulturalInsights, GenerationMetadata, PersonaDraft, PersonaResult,
    SignalOrigin, TasteQuery, validate_draft,
};
use crate::{KvasirError, Result};

/// Categories fetched for every persona.
pub(crate) const REQUIRED_CATEGORIES: [Category; 5] = [
    Category::Music,
    Category::Brands,
    Category::Movies,
    Category::Books,
    Category::Tv,
];

/// Entities kept per category after merging.
const CATEGORY_CAP: usize = 10;

/// The assembled coordination core.
pub struct PersonaEngine {
    scheduler: RequestScheduler,
    taste: Arc<dyn SignalSource>,
    llm: Arc<dyn DraftSource>,
    monitor: HealthMonitor,
}

impl std::fmt::Debug for PersonaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonaEngine").finish_non_exhaustive()
    }
}

impl PersonaEngine {
    pub(crate) fn new(
        scheduler: RequestScheduler,
        taste: Arc<dyn SignalSource>,
        llm: Arc<dyn DraftSource>,
        monitor: HealthMonitor,
    ) -> Self {
        Self {
            scheduler,
            taste,
            llm,
            monitor,
        }
    }

    /// The scheduler primitive, reusable by any adapter-shaped caller.
    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    /// The health monitor (probe rounds can be driven manually).
    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    async fn generate_one(&self, brief: &Brief, variant: u8) -> Result<PersonaResult> {
        let config = self.scheduler.current_config();
        let total_started = Instant::now();

        // Enrichment: all categories in parallel; each either yields
        // live signals, degrades to fallback, or (fallback disallowed)
        // fails the persona.
        let fetches = REQUIRED_CATEGORIES.map(|category| {
            let taste = Arc::clone(&self.taste);
            let query = TasteQuery {
                category,
                interests: brief.interests().to_vec(),
                age_range: brief.age_range(),
                location: brief.location().map(str::to_string),
            };
            async move { (category, taste.entities(query, true).await) }
        });
        let outcomes = join_all(fetches).await;
        let taste_latency = total_started.elapsed();

        let mut insights = CulturalInsights::new();
        for (category, outcome) in outcomes {
            match outcome {
                Ok(entities) if !entities.is_empty() => insights.insert_live(category, entities),
                Ok(_) if config.fallback_allowed => {
                    debug!(category = %category, "empty category, using fallback signals");
                    insights.insert_fallback(category, fallback::entities(category));
                }
                Ok(_) => insights.insert_live(category, Vec::new()),
                Err(err) if config.fallback_allowed => {
                    warn!(category = %category, error = %err, "category degraded to fallback");
                    insights.insert_fallback(category, fallback::entities(category));
                }
                Err(err) => return Err(err),
            }
        }

        // Draft, validate, and at most one corrective re-prompt.
        let llm_started = Instant::now();
        let composed = prompt::compose(brief, &insights, variant, brief.count());
        let threshold = config.validation_threshold;
        let mut corrective_retries = 0;
        let (draft, score) = match self.draft_validated(&composed, threshold).await {
            Ok(pair) => pair,
            Err(KvasirError::ValidationFailed { score, threshold }) => {
                corrective_retries = 1;
                debug!(score, threshold, "draft below threshold, corrective re-prompt");
                let corrected = prompt::corrective(&composed, score, threshold);
                self.draft_validated(&corrected, threshold).await?
            }
            Err(err) => return Err(err),
        };
        let llm_latency = llm_started.elapsed();

        // Merge: dedup within categories, cap, and fold confidences.
        insights.dedup_and_cap(CATEGORY_CAP);
        let fallback_categories = insights.fallback_categories();
        let mut sources_used = Vec::new();
        let any_live = insights
            .iter()
            .any(|(_, s)| s.origin == SignalOrigin::Live && !s.entities.is_empty());
        if any_live {
            sources_used.push("taste".to_string());
        }
        if !fallback_categories.is_empty() {
            sources_used.push("fallback".to_string());
        }
        sources_used.push("llm".to_string());

        let confidence = 0.7 * score + 0.3 * signal_confidence(&insights);

        Ok(PersonaResult {
            persona: draft,
            insights,
            metadata: GenerationMetadata {
                taste_latency,
                llm_latency,
                total_latency: total_started.elapsed(),
                sources_used,
                fallback_categories,
                confidence,
                corrective_retries,
            },
        })
    }

    async fn draft_validated(&self, prompt: &str, threshold: f32) -> Result<(PersonaDraft, f32)> {
        let draft = self.llm.draft(prompt).await?;
        let score = validate_draft(&draft, threshold)?;
        Ok((draft, score))
    }
}

/// Mean confidence of the leading entities across categories; 0.5 when
/// there is nothing to average.
fn signal_confidence(insights: &CulturalInsights) -> f32 {
    let leads: Vec<f32> = insights
        .iter()
        .filter_map(|(_, signals)| signals.entities.first().map(|e| e.confidence))
        .collect();
    if leads.is_empty() {
        0.5
    } else {
        leads.iter().sum::<f32>() / leads.len() as f32
    }
}

#[async_trait]
impl PersonaGateway for PersonaEngine {
    async fn generate(&self, brief: Brief) -> Result<Vec<PersonaResult>> {
        let spacing = self.scheduler.current_config().persona_spacing;
        let count = brief.count();
        let mut personas = Vec::with_capacity(count as usize);
        for variant in 0..count {
            if variant > 0 {
                // Smooth downstream pressure between orchestrations.
                tokio::time::sleep(spacing).await;
            }
            match self.generate_one(&brief, variant).await {
                Ok(result) => {
                    metrics::counter!(telemetry::PERSONAS_TOTAL, "status" => "ok").increment(1);
                    personas.push(result);
                }
                Err(err) => {
                    metrics::counter!(telemetry::PERSONAS_TOTAL, "status" => "error").increment(1);
                    return Err(err);
                }
            }
        }
        Ok(personas)
    }

    fn health_snapshot(&self) -> HealthSnapshot {
        self.monitor.snapshot()
    }

    fn update_config(&self, update: ConfigUpdate) {
        self.scheduler.update_config(update);
    }

    fn stats(&self) -> StatsSnapshot {
        self.scheduler.stats()
    }

    fn reset_stats(&self) {
        self.scheduler.reset_stats();
    }

    async fn cleanup(&self) {
        self.monitor.stop();
        self.scheduler.cleanup();
    }
}
