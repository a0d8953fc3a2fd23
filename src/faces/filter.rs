//! Demographic filtering of detected faces.

use super::{DetectedFace, Gender};
use crate::error::{FinderError, Result};

/// Inclusive age bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeRange {
    pub min: f64,
    pub max: f64,
}

impl AgeRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, age: f64) -> bool {
        age >= self.min && age <= self.max
    }
}

/// Criteria a face must satisfy. Each is independently enabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub age: Option<AgeRange>,
    pub male_only: bool,
    pub female_only: bool,
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        self.age.is_none() && !self.male_only && !self.female_only
    }

    /// Reject criteria that can never match anything.
    pub fn validate(&self) -> Result<()> {
        if let Some(range) = self.age {
            if range.min.is_nan() || range.max.is_nan() || range.min > range.max {
                return Err(FinderError::Validation(format!(
                    "minimum age {} is above maximum age {}",
                    range.min, range.max
                )));
            }
        }
        if self.male_only && self.female_only {
            return Err(FinderError::Validation(
                "male-only and female-only cannot be combined".to_string(),
            ));
        }
        Ok(())
    }

    pub fn matches(&self, face: &DetectedFace) -> bool {
        if let Some(range) = self.age {
            if !range.contains(face.age) {
                return false;
            }
        }
        if self.male_only && face.gender != Gender::Male {
            return false;
        }
        if self.female_only && face.gender != Gender::Female {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterVerdict {
    pub accepted: bool,
    /// Matching faces in detection order.
    pub matched: Vec<DetectedFace>,
    /// `"<gender> <age>"` per matched face, space separated.
    pub summary: String,
}

/// Decide whether an image qualifies given the faces detected in it.
pub fn evaluate(faces: &[DetectedFace], criteria: &SearchCriteria) -> FilterVerdict {
    let matched: Vec<DetectedFace> = faces
        .iter()
        .filter(|face| criteria.matches(face))
        .cloned()
        .collect();

    let summary = matched
        .iter()
        .map(|face| format!("{} {}", face.gender, face.age))
        .collect::<Vec<_>>()
        .join(" ");

    FilterVerdict {
        accepted: !matched.is_empty(),
        matched,
        summary,
    }
}
