//! Responses flowing back through the scheduler.

use serde::{Deserialize, Serialize};

use super::insights::Entity;
use crate::{KvasirError, Result};

/// Token accounting reported by the LLM provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Raw LLM completion before structured parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCompletion {
    pub text: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// The closed set of values the scheduler moves, caches, and fans out.
///
/// A closed enum (rather than a generic parameter) keeps the flight
/// table and cache monomorphic; adapters narrow with the `expect_*`
/// helpers after the scheduler hands the value back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderResponse {
    /// Entity list from a Taste lookup.
    Entities(Vec<Entity>),
    /// Raw completion from the LLM provider.
    Completion(LlmCompletion),
    /// Bodyless acknowledgement (health probes).
    Ack,
}

impl ProviderResponse {
    /// Narrow to an entity list.
    pub fn expect_entities(self) -> Result<Vec<Entity>> {
        match self {
            Self::Entities(entities) => Ok(entities),
            other => Err(KvasirError::ParseInvalid(format!(
                "expected entity list, got {}",
                other.variant_name()
            ))),
        }
    }

    /// Narrow to a completion.
    pub fn expect_completion(self) -> Result<LlmCompletion> {
        match self {
            Self::Completion(completion) => Ok(completion),
            other => Err(KvasirError::ParseInvalid(format!(
                "expected completion, got {}",
                other.variant_name()
            ))),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Self::Entities(_) => "entities",
            Self::Completion(_) => "completion",
            Self::Ack => "ack",
        }
    }

    /// Approximate heap footprint, used as the cache weigher.
    pub(crate) fn approx_size(&self) -> usize {
        match self {
            Self::Entities(entities) => entities
                .iter()
                .map(|e| {
                    e.id.len()
                        + e.name.len()
                        + e.tags.iter().map(String::len).sum::<usize>()
                        + std::mem::size_of::<Entity>()
                })
                .sum(),
            Self::Completion(c) => {
                c.text.len()
                    + c.model.as_deref().map_or(0, str::len)
                    + std::mem::size_of::<LlmCompletion>()
            }
            Self::Ack => std::mem::size_of::<Self>(),
        }
    }
}
