pub mod filter;
pub mod reference;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use filter::{evaluate, AgeRange, FilterVerdict, SearchCriteria};
pub use reference::{
    canonical_name, subject_id, PersistedFaceRef, ReferenceManager, ReferenceSubject,
    TrainingPolicy, Verification,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "male" => Gender::Male,
            "female" => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// A face found by the detection service. Only valid for the call that
/// produced it; the id expires remotely after a short time.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub face_id: String,
    pub age: f64,
    pub gender: Gender,
}
