//! Cultural signal types returned by the Taste provider.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A cultural category the Taste provider can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Music,
    Brands,
    Movies,
    Books,
    Tv,
    Food,
    Travel,
    Fashion,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Music,
        Category::Brands,
        Category::Movies,
        Category::Books,
        Category::Tv,
        Category::Food,
        Category::Travel,
        Category::Fashion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Brands => "brands",
            Self::Movies => "movies",
            Self::Books => "books",
            Self::Tv => "tv",
            Self::Food => "food",
            Self::Travel => "travel",
            Self::Fashion => "fashion",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recommended entity within a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable provider-side identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Relevance confidence in [0, 1].
    pub confidence: f32,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, confidence: f32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tags: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Where a category's signals came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOrigin {
    /// Fetched from the Taste provider for this request.
    Live,
    /// Substituted from the built-in fallback table after the live fetch
    /// returned nothing or failed.
    Fallback,
}

/// The entities for one category together with their origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySignals {
    pub origin: SignalOrigin,
    pub entities: Vec<Entity>,
}

/// Per-category cultural signals for one persona request.
///
/// Categories are disjoint by construction (one slot per category) and
/// live entities are ordered by non-increasing confidence. Fallback
/// entries have their confidence clamped to ≤ 0.5.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CulturalInsights {
    categories: BTreeMap<Category, CategorySignals>,
}

/// Confidence ceiling applied to fallback entities.
pub(crate) const FALLBACK_CONFIDENCE_CAP: f32 = 0.5;

impl CulturalInsights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record live signals for a category, enforcing the confidence order.
    pub fn insert_live(&mut self, category: Category, mut entities: Vec<Entity>) {
        entities.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.categories.insert(
            category,
            CategorySignals {
                origin: SignalOrigin::Live,
                entities,
            },
        );
    }

    /// Record fallback signals for a category. Confidence is capped so a
    /// degraded category can never outrank live data downstream.
    pub fn insert_fallback(&mut self, category: Category, mut entities: Vec<Entity>) {
        for e in &mut entities {
            e.confidence = e.confidence.min(FALLBACK_CONFIDENCE_CAP);
        }
        self.categories.insert(
            category,
            CategorySignals {
                origin: SignalOrigin::Fallback,
                entities,
            },
        );
    }

    pub fn get(&self, category: Category) -> Option<&CategorySignals> {
        self.categories.get(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategorySignals)> {
        self.categories.iter().map(|(c, s)| (*c, s))
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Categories that were served from the fallback table.
    pub fn fallback_categories(&self) -> Vec<Category> {
        self.categories
            .iter()
            .filter(|(_, s)| s.origin == SignalOrigin::Fallback)
            .map(|(c, _)| *c)
            .collect()
    }

    /// True if every requested category degraded to fallback.
    pub fn all_fallback(&self) -> bool {
        !self.categories.is_empty()
            && self
                .categories
                .values()
                .all(|s| s.origin == SignalOrigin::Fallback)
    }

    /// Deduplicate by entity id within each category and cap each
    /// category at `cap` entities, keeping the highest-confidence ones.
    pub fn dedup_and_cap(&mut self, cap: usize) {
        for signals in self.categories.values_mut() {
            let mut seen = std::collections::HashSet::new();
            signals.entities.retain(|e| seen.insert(e.id.clone()));
            signals.entities.truncate(cap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_entities_sorted_by_confidence() {
        let mut insights = CulturalInsights::new();
        insights.insert_live(
            Category::Music,
            vec![
                Entity::new("a", "A", 0.3),
                Entity::new("b", "B", 0.9),
                Entity::new("c", "C", 0.6),
            ],
        );
        let entities = &insights.get(Category::Music).unwrap().entities;
        let confidences: Vec<f32> = entities.iter().map(|e| e.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.6, 0.3]);
    }

    #[test]
    fn fallback_confidence_capped() {
        let mut insights = CulturalInsights::new();
        insights.insert_fallback(Category::Brands, vec![Entity::new("x", "X", 0.95)]);
        let signals = insights.get(Category::Brands).unwrap();
        assert_eq!(signals.origin, SignalOrigin::Fallback);
        assert!(signals.entities[0].confidence <= 0.5);
        assert_eq!(insights.fallback_categories(), vec![Category::Brands]);
    }

    #[test]
    fn dedup_and_cap_keeps_highest_first() {
        let mut insights = CulturalInsights::new();
        insights.insert_live(
            Category::Books,
            vec![
                Entity::new("a", "A", 0.9),
                Entity::new("a", "A again", 0.8),
                Entity::new("b", "B", 0.7),
                Entity::new("c", "C", 0.6),
            ],
        );
        insights.dedup_and_cap(2);
        let entities = &insights.get(Category::Books).unwrap().entities;
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id, "a");
        assert_eq!(entities[1].id, "b");
    }

    #[test]
    fn entity_confidence_clamped_on_construction() {
        assert_eq!(Entity::new("a", "A", 1.7).confidence, 1.0);
        assert_eq!(Entity::new("a", "A", -0.2).confidence, 0.0);
    }
}
