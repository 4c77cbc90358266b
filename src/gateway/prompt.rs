//! Prompt composition for the persona draft step.
//!
//! The template corpus proper lives upstream; the core only composes
//! the request that carries the brief and the cultural signals, and the
//! corrective variant used after a validation failure.

use std::fmt::Write;

use crate::types::{Brief, CulturalInsights, SignalOrigin};

/// Compose the draft prompt from the brief and enrichment signals.
///
/// `variant` distinguishes personas within one multi-persona brief so
/// repeated requests do not collapse onto one cached completion.
pub(crate) fn compose(brief: &Brief, insights: &CulturalInsights, variant: u8, total: u8) -> String {
    let mut prompt = String::with_capacity(1024);

    let _ = writeln!(
        prompt,
        "Create marketing persona {} of {} for this audience.",
        variant + 1,
        total
    );
    if total > 1 {
        prompt.push_str("Make this persona clearly distinct from the others.\n");
    }
    let _ = writeln!(prompt, "\nAudience description: {}", brief.description());
    let _ = writeln!(prompt, "Age range: {}", brief.age_range());
    if let Some(location) = brief.location() {
        let _ = writeln!(prompt, "Location: {location}");
    }
    let _ = writeln!(prompt, "Interests: {}", brief.interests().join(", "));
    let _ = writeln!(prompt, "Values: {}", brief.values().join(", "));

    if !insights.is_empty() {
        prompt.push_str("\nCultural signals (ordered by relevance):\n");
        for (category, signals) in insights.iter() {
            let names: Vec<&str> = signals
                .entities
                .iter()
                .take(5)
                .map(|e| e.name.as_str())
                .collect();
            if names.is_empty() {
                continue;
            }
            let marker = match signals.origin {
                SignalOrigin::Live => "",
                SignalOrigin::Fallback => " (low confidence)",
            };
            let _ = writeln!(prompt, "- {category}{marker}: {}", names.join(", "));
        }
    }

    prompt.push_str(
        "\nRespond with ONLY a JSON object, no prose and no code fences, shaped as:\n\
         {\"name\": string, \
         \"demographics\": {\"age\": number, \"occupation\": string, \"location\": string}, \
         \"psychographics\": {\"personality_traits\": [string], \"values\": [string], \
         \"lifestyle\": string, \"motivations\": [string]}, \
         \"communication\": {\"preferred_channels\": [string], \"tone\": string, \
         \"content_formats\": [string]}, \
         \"marketing\": {\"pain_points\": [string], \"buying_triggers\": [string], \
         \"barriers\": [string], \"brand_affinities\": [string]}, \
         \"confidence\": number between 0 and 1}",
    );
    prompt
}

/// Corrective prompt after a validation failure: quote what was weak
/// and ask for a complete draft.
pub(crate) fn corrective(original: &str, score: f32, threshold: f32) -> String {
    format!(
        "{original}\n\nYour previous draft was too sparse (completeness {score:.2}, \
         required {threshold:.2}). Fill every field with specific, non-empty values \
         and respond with ONLY the JSON object."
    )
}
