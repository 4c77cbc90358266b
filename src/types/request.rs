//! Typed request payloads carried through the batcher.

use serde::{Deserialize, Serialize};

use super::brief::AgeRange;
use super::insights::Category;

/// One Taste entity lookup: a category plus the audience signals that
/// seed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasteQuery {
    pub category: Category,
    pub interests: Vec<String>,
    pub age_range: AgeRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// The closed set of payloads a batch executor can receive.
///
/// Homogeneity is structural: a batch is keyed by (provider, request
/// type), so one batch only ever sees one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchPayload {
    TasteEntities(TasteQuery),
}

impl BatchPayload {
    /// Narrow to a Taste query; executors for other types never see
    /// this variant.
    pub fn into_taste_query(self) -> TasteQuery {
        match self {
            Self::TasteEntities(query) => query,
        }
    }
}
