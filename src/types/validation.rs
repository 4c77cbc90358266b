//! Structural validation scoring for persona drafts.
//!
//! The core scores drafts for structural completeness before handing
//! them to callers; a draft below threshold triggers exactly one
//! corrective re-prompt in the orchestrator. Deep schema validation is
//! the upstream service's concern.

use crate::{KvasirError, Result};

use super::persona::PersonaDraft;

/// Default minimum acceptable validation score.
pub const DEFAULT_VALIDATION_THRESHOLD: f32 = 0.6;

/// Score a draft's structural completeness in [0, 1].
///
/// Each populated section contributes equally; within list-valued
/// sections, an empty list counts as unpopulated. The model's own
/// confidence is folded in with a small weight so a model that flags
/// its output as weak lands below threshold even when fields are
/// present.
pub fn score_draft(draft: &PersonaDraft) -> f32 {
    let mut populated = 0u32;
    let mut total = 0u32;

    let mut check = |present: bool| {
        total += 1;
        if present {
            populated += 1;
        }
    };

    check(!draft.name.trim().is_empty());
    check(!draft.demographics.occupation.trim().is_empty());
    check(!draft.demographics.location.trim().is_empty());
    check(draft.demographics.age.is_some());
    check(!draft.psychographics.personality_traits.is_empty());
    check(!draft.psychographics.values.is_empty());
    check(!draft.psychographics.lifestyle.trim().is_empty());
    check(!draft.psychographics.motivations.is_empty());
    check(!draft.communication.preferred_channels.is_empty());
    check(!draft.communication.tone.trim().is_empty());
    check(!draft.marketing.pain_points.is_empty());
    check(!draft.marketing.buying_triggers.is_empty());

    let structural = populated as f32 / total as f32;
    let model_confidence = draft.confidence.clamp(0.0, 1.0);

    0.85 * structural + 0.15 * model_confidence
}

/// Validate a draft against `threshold`, returning `ValidationFailed`
/// with the computed score when it falls short.
pub fn validate_draft(draft: &PersonaDraft, threshold: f32) -> Result<f32> {
    let score = score_draft(draft);
    if score < threshold {
        return Err(KvasirError::ValidationFailed { score, threshold });
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::persona::{
        Communication, Demographics, Marketing, PersonaDraft, Psychographics,
    };

    fn full_draft() -> PersonaDraft {
        PersonaDraft {
            name: "Maya".into(),
            demographics: Demographics {
                age: Some(31),
                occupation: "UX designer".into(),
                location: "Lisbon".into(),
                income_bracket: Some("mid".into()),
                education: None,
            },
            psychographics: Psychographics {
                personality_traits: vec!["curious".into()],
                values: vec!["sustainability".into()],
                lifestyle: "urban, car-free".into(),
                motivations: vec!["community".into()],
            },
            communication: Communication {
                preferred_channels: vec!["newsletters".into()],
                tone: "warm".into(),
                content_formats: vec!["long-form".into()],
            },
            marketing: Marketing {
                pain_points: vec!["greenwashing".into()],
                buying_triggers: vec!["peer recommendations".into()],
                barriers: vec![],
                brand_affinities: vec![],
            },
            confidence: 0.9,
        }
    }

    #[test]
    fn complete_draft_passes() {
        let score = validate_draft(&full_draft(), DEFAULT_VALIDATION_THRESHOLD).unwrap();
        assert!(score > 0.9);
    }

    #[test]
    fn hollow_draft_fails() {
        let draft = PersonaDraft {
            name: "".into(),
            demographics: Demographics::default(),
            psychographics: Psychographics::default(),
            communication: Communication::default(),
            marketing: Marketing::default(),
            confidence: 0.0,
        };
        let err = validate_draft(&draft, DEFAULT_VALIDATION_THRESHOLD).unwrap_err();
        assert!(matches!(err, KvasirError::ValidationFailed { .. }));
    }

    #[test]
    fn low_model_confidence_drags_score_down() {
        let mut draft = full_draft();
        draft.confidence = 0.0;
        assert!(score_draft(&draft) < score_draft(&full_draft()));
    }
}
