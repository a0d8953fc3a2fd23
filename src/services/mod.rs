//! Remote face and vision services.
//!
//! The pipeline and the reference person manager only see the traits in
//! this module; `face_client` and `vision_client` implement them over HTTP.

pub mod face_client;
pub mod vision_client;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FinderError, Result};
use crate::faces::DetectedFace;

pub use face_client::FaceClient;
pub use vision_client::VisionClient;

/// Finds faces and estimates their age and gender.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>>;
}

/// Image analysis used to enrich qualifying results.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Render a thumbnail of the given size, returned in the source encoding.
    async fn thumbnail(&self, width: u32, height: u32, image: &[u8]) -> Result<Vec<u8>>;

    /// Candidate captions, best first.
    async fn describe(&self, image: &[u8]) -> Result<Vec<String>>;

    /// Printed text grouped into regions of lines of words.
    async fn recognize_text(&self, image: &[u8]) -> Result<Vec<TextRegion>>;
}

/// Storage and training of named people inside person groups.
#[async_trait]
pub trait PersonGroupService: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<PersonGroup>>;
    async fn get_group(&self, group_id: &str) -> Result<Option<PersonGroup>>;
    async fn create_group(&self, group_id: &str, name: &str) -> Result<()>;
    async fn delete_group(&self, group_id: &str) -> Result<()>;

    async fn list_persons(&self, group_id: &str) -> Result<Vec<Person>>;
    async fn create_person(&self, group_id: &str, name: &str) -> Result<Person>;

    /// Attach a face image to a person, tagged with `user_data`. Returns the persisted face id.
    async fn add_face(
        &self,
        group_id: &str,
        person_id: &str,
        image: &[u8],
        user_data: &str,
    ) -> Result<String>;
    async fn get_face(&self, group_id: &str, person_id: &str, face_id: &str)
        -> Result<PersistedFace>;
    async fn delete_face(&self, group_id: &str, person_id: &str, face_id: &str) -> Result<()>;

    async fn train(&self, group_id: &str) -> Result<()>;
    async fn training_status(&self, group_id: &str) -> Result<TrainingStatus>;

    async fn verify(&self, face_id: &str, person_id: &str, group_id: &str)
        -> Result<VerifyOutcome>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonGroup {
    pub person_group_id: String,
    pub name: String,
    #[serde(default)]
    pub user_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub person_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub persisted_face_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedFace {
    pub persisted_face_id: String,
    #[serde(default)]
    pub user_data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl TrainingStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TrainingStatus::Succeeded | TrainingStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub is_identical: bool,
    pub confidence: f64,
}

/// One OCR region: lines of words.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextRegion {
    pub lines: Vec<Vec<String>>,
}

/// Run a blocking HTTP call off the async runtime.
pub(crate) async fn run_blocking<T, F>(operation: &'static str, call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| FinderError::service(operation, e))?
}

/// Convert a transport or status failure into a service error.
pub(crate) fn http_error(operation: &'static str, err: ureq::Error) -> FinderError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            FinderError::service(operation, format!("HTTP {}: {}", code, body.trim()))
        }
        ureq::Error::Transport(transport) => FinderError::service(operation, transport),
    }
}

pub(crate) fn agent(timeout: std::time::Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_status_wire_names() {
        let status: TrainingStatus = serde_json::from_str("\"notstarted\"").unwrap();
        assert_eq!(status, TrainingStatus::NotStarted);
        let status: TrainingStatus = serde_json::from_str("\"succeeded\"").unwrap();
        assert!(status.is_finished());
        assert!(!TrainingStatus::Running.is_finished());
    }

    #[test]
    fn test_person_wire_format() {
        let person: Person = serde_json::from_str(
            r#"{"personId":"p1","name":"Ada","persistedFaceIds":["f1","f2"],"userData":null}"#,
        )
        .unwrap();
        assert_eq!(person.person_id, "p1");
        assert_eq!(person.persisted_face_ids, vec!["f1", "f2"]);
    }

    #[test]
    fn test_verify_wire_format() {
        let outcome: VerifyOutcome =
            serde_json::from_str(r#"{"isIdentical":true,"confidence":0.81}"#).unwrap();
        assert!(outcome.is_identical);
        assert!((outcome.confidence - 0.81).abs() < 1e-9);
    }
}
