//! Provider, endpoint, and request classification enums.
//!
//! These are the keys the coordination mechanisms are partitioned by:
//! the limiter and health monitor work per [`Endpoint`], the circuit
//! breaker per [`Provider`], the batcher per ([`Provider`],
//! [`RequestType`]).

use serde::{Deserialize, Serialize};

/// An external provider the core mediates calls to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Cultural-recommendations provider.
    Taste,
    /// Large-language-model provider.
    Llm,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Taste => "taste",
            Self::Llm => "llm",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical provider endpoint with its own rate budget and health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Taste entity lookup (single category or batched).
    TasteEntities,
    /// Taste health endpoint.
    TasteProbe,
    /// LLM text completion.
    LlmComplete,
    /// LLM health endpoint.
    LlmProbe,
}

impl Endpoint {
    /// Every endpoint, for iteration in stats and health snapshots.
    pub const ALL: [Endpoint; 4] = [
        Endpoint::TasteEntities,
        Endpoint::TasteProbe,
        Endpoint::LlmComplete,
        Endpoint::LlmProbe,
    ];

    pub fn provider(&self) -> Provider {
        match self {
            Self::TasteEntities | Self::TasteProbe => Provider::Taste,
            Self::LlmComplete | Self::LlmProbe => Provider::Llm,
        }
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            Self::TasteEntities => RequestType::TasteEntities,
            Self::LlmComplete => RequestType::LlmCompletion,
            Self::TasteProbe | Self::LlmProbe => RequestType::HealthProbe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TasteEntities => "taste_entities",
            Self::TasteProbe => "taste_probe",
            Self::LlmComplete => "llm_complete",
            Self::LlmProbe => "llm_probe",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request classification used for batch eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    TasteEntities,
    LlmCompletion,
    HealthProbe,
}

/// Admission priority. Equal priorities are served FIFO; higher
/// priorities are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_provider_mapping() {
        assert_eq!(Endpoint::TasteEntities.provider(), Provider::Taste);
        assert_eq!(Endpoint::LlmComplete.provider(), Provider::Llm);
        assert_eq!(Endpoint::LlmProbe.provider(), Provider::Llm);
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
