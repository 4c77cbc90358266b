//! Persona draft and result types.
//!
//! [`PersonaDraft`] is what the LLM step parses its structured response
//! into; [`PersonaResult`] is the merged, validated output handed back to
//! callers together with generation metadata. Deep domain validation of
//! the persona schema lives upstream — the core only scores structural
//! completeness (see [`score_draft`](crate::types::score_draft)).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::insights::{Category, CulturalInsights};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub income_bracket: Option<String>,
    #[serde(default)]
    pub education: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Psychographics {
    #[serde(default)]
    pub personality_traits: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub lifestyle: String,
    #[serde(default)]
    pub motivations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Communication {
    #[serde(default)]
    pub preferred_channels: Vec<String>,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub content_formats: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Marketing {
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub buying_triggers: Vec<String>,
    #[serde(default)]
    pub barriers: Vec<String>,
    #[serde(default)]
    pub brand_affinities: Vec<String>,
}

/// Structured output of the LLM step, before merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaDraft {
    pub name: String,
    pub demographics: Demographics,
    pub psychographics: Psychographics,
    pub communication: Communication,
    pub marketing: Marketing,
    /// Model-reported confidence in [0, 1].
    #[serde(default)]
    pub confidence: f32,
}

/// Timing and provenance attached to every generated persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Wall time of the Taste enrichment step (all categories).
    pub taste_latency: Duration,
    /// Wall time of the LLM step (including any corrective retry).
    pub llm_latency: Duration,
    /// End-to-end time for this persona.
    pub total_latency: Duration,
    /// Providers that contributed ("taste", "llm", "fallback").
    pub sources_used: Vec<String>,
    /// Categories served from the fallback table.
    pub fallback_categories: Vec<Category>,
    /// Combined confidence of draft and signals.
    pub confidence: f32,
    /// Corrective re-prompts spent (0 or 1).
    pub corrective_retries: u32,
}

/// A generated persona: the validated draft, the signals that informed
/// it, and generation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaResult {
    pub persona: PersonaDraft,
    pub insights: CulturalInsights,
    pub metadata: GenerationMetadata,
}
