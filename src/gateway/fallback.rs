//! Built-in fallback signals for degraded Taste categories.
//!
//! When a category fetch fails (or returns nothing) and fallbacks are
//! allowed, these broadly popular entities stand in so the LLM still
//! receives something to anchor on. Confidence stays at or below 0.5
//! and decreases within each list.

use crate::types::{Category, Entity};

pub(crate) fn entities(category: Category) -> Vec<Entity> {
    let seeds: &[(&str, &str, f32)] = match category {
        Category::Music => &[
            ("fb-music-1", "Indie playlists", 0.50),
            ("fb-music-2", "Classic rock", 0.45),
            ("fb-music-3", "Lo-fi beats", 0.40),
        ],
        Category::Brands => &[
            ("fb-brands-1", "Nike", 0.50),
            ("fb-brands-2", "Apple", 0.45),
            ("fb-brands-3", "IKEA", 0.40),
        ],
        Category::Movies => &[
            ("fb-movies-1", "Feel-good comedies", 0.50),
            ("fb-movies-2", "Documentaries", 0.45),
            ("fb-movies-3", "Sci-fi classics", 0.40),
        ],
        Category::Books => &[
            ("fb-books-1", "Contemporary fiction", 0.50),
            ("fb-books-2", "Self-improvement", 0.45),
            ("fb-books-3", "Biographies", 0.40),
        ],
        Category::Tv => &[
            ("fb-tv-1", "Streaming dramas", 0.50),
            ("fb-tv-2", "Cooking shows", 0.45),
            ("fb-tv-3", "True crime", 0.40),
        ],
        Category::Food => &[
            ("fb-food-1", "Coffee culture", 0.50),
            ("fb-food-2", "Street food", 0.45),
            ("fb-food-3", "Home cooking", 0.40),
        ],
        Category::Travel => &[
            ("fb-travel-1", "City breaks", 0.50),
            ("fb-travel-2", "National parks", 0.45),
            ("fb-travel-3", "Budget travel", 0.40),
        ],
        Category::Fashion => &[
            ("fb-fashion-1", "Athleisure", 0.50),
            ("fb-fashion-2", "Sustainable fashion", 0.45),
            ("fb-fashion-3", "Vintage finds", 0.40),
        ],
    };
    seeds
        .iter()
        .map(|(id, name, confidence)| Entity::new(*id, *name, *confidence))
        .collect()
}
