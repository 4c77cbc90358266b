//! Caller input: the persona brief.

use serde::{Deserialize, Serialize};

use crate::{KvasirError, Result};

/// Bounds on [`Brief`] fields, enforced at build time.
pub const DESCRIPTION_MIN_CHARS: usize = 10;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const INTERESTS_MAX: usize = 15;
pub const VALUES_MAX: usize = 10;
pub const COUNT_MAX: u8 = 3;

/// Target age bracket for the persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeRange {
    #[serde(rename = "18-24")]
    From18To24,
    #[serde(rename = "25-34")]
    From25To34,
    #[serde(rename = "35-44")]
    From35To44,
    #[serde(rename = "45-54")]
    From45To54,
    #[serde(rename = "55-64")]
    From55To64,
    #[serde(rename = "65+")]
    Over65,
}

impl AgeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::From18To24 => "18-24",
            Self::From25To34 => "25-34",
            Self::From35To44 => "35-44",
            Self::From45To54 => "45-54",
            Self::From55To64 => "55-64",
            Self::Over65 => "65+",
        }
    }
}

impl std::fmt::Display for AgeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable caller input describing the persona(s) to generate.
///
/// Construct through [`Brief::builder()`]; `build()` enforces the field
/// constraints and returns `InvalidInput` otherwise, so a `Brief` in hand
/// is always valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    description: String,
    interests: Vec<String>,
    values: Vec<String>,
    age_range: AgeRange,
    location: Option<String>,
    count: u8,
}

impl Brief {
    /// Start building a brief.
    pub fn builder() -> BriefBuilder {
        BriefBuilder::default()
    }

    /// Free-text description of the target audience (10–1000 chars).
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Audience interests (1–15 entries).
    pub fn interests(&self) -> &[String] {
        &self.interests
    }

    /// Audience values (1–10 entries).
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn age_range(&self) -> AgeRange {
        self.age_range
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Number of personas to generate (1–3, default 1).
    pub fn count(&self) -> u8 {
        self.count
    }
}

/// Builder for [`Brief`]. Validation happens in [`build()`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct BriefBuilder {
    description: String,
    interests: Vec<String>,
    values: Vec<String>,
    age_range: Option<AgeRange>,
    location: Option<String>,
    count: Option<u8>,
}

impl BriefBuilder {
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn interest(mut self, interest: impl Into<String>) -> Self {
        self.interests.push(interest.into());
        self
    }

    pub fn interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests.extend(interests.into_iter().map(Into::into));
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn age_range(mut self, range: AgeRange) -> Self {
        self.age_range = Some(range);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn count(mut self, count: u8) -> Self {
        self.count = Some(count);
        self
    }

    /// Validate and build the immutable brief.
    pub fn build(self) -> Result<Brief> {
        let chars = self.description.chars().count();
        if chars < DESCRIPTION_MIN_CHARS || chars > DESCRIPTION_MAX_CHARS {
            return Err(KvasirError::InvalidInput(format!(
                "description must be {DESCRIPTION_MIN_CHARS}-{DESCRIPTION_MAX_CHARS} characters, got {chars}"
            )));
        }
        if self.interests.is_empty() || self.interests.len() > INTERESTS_MAX {
            return Err(KvasirError::InvalidInput(format!(
                "interests must have 1-{INTERESTS_MAX} entries, got {}",
                self.interests.len()
            )));
        }
        if self.values.is_empty() || self.values.len() > VALUES_MAX {
            return Err(KvasirError::InvalidInput(format!(
                "values must have 1-{VALUES_MAX} entries, got {}",
                self.values.len()
            )));
        }
        let age_range = self
            .age_range
            .ok_or_else(|| KvasirError::InvalidInput("age_range is required".into()))?;
        let count = self.count.unwrap_or(1);
        if count == 0 || count > COUNT_MAX {
            return Err(KvasirError::InvalidInput(format!(
                "count must be 1-{COUNT_MAX}, got {count}"
            )));
        }

        Ok(Brief {
            description: self.description,
            interests: self.interests,
            values: self.values,
            age_range,
            location: self.location,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BriefBuilder {
        Brief::builder()
            .description("Eco-conscious urban commuters in their thirties")
            .interests(["cycling", "sustainability"])
            .value("community")
            .age_range(AgeRange::From25To34)
    }

    #[test]
    fn valid_brief_builds() {
        let brief = valid().build().unwrap();
        assert_eq!(brief.count(), 1);
        assert_eq!(brief.age_range().as_str(), "25-34");
    }

    #[test]
    fn short_description_rejected() {
        let err = valid().description("too short").build().unwrap_err();
        assert!(matches!(err, KvasirError::InvalidInput(_)));
    }

    #[test]
    fn empty_interests_rejected() {
        let err = Brief::builder()
            .description("A perfectly reasonable description")
            .value("authenticity")
            .age_range(AgeRange::From35To44)
            .build()
            .unwrap_err();
        assert!(matches!(err, KvasirError::InvalidInput(_)));
    }

    #[test]
    fn count_capped_at_three() {
        assert!(valid().count(3).build().is_ok());
        assert!(valid().count(4).build().is_err());
        assert!(valid().count(0).build().is_err());
    }

    #[test]
    fn too_many_interests_rejected() {
        let brief = valid().interests((0..14).map(|i| format!("i{i}"))).build();
        assert!(brief.is_err()); // 2 seed interests + 14 = 16
    }
}
