use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    agent, http_error, run_blocking, FaceDetector, Person, PersonGroup, PersonGroupService,
    PersistedFace, TrainingStatus, VerifyOutcome,
};
use crate::config::ServiceConfig;
use crate::error::{FinderError, Result};
use crate::faces::{DetectedFace, Gender};

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Client for the Face REST API (detection, person groups, verification).
#[derive(Clone)]
pub struct FaceClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectResponse {
    face_id: Option<String>,
    face_attributes: Option<FaceAttributes>,
}

#[derive(Debug, Deserialize)]
struct FaceAttributes {
    age: Option<f64>,
    gender: Option<String>,
}

#[derive(Debug, Serialize)]
struct NameRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePersonResponse {
    person_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddFaceResponse {
    persisted_face_id: String,
}

#[derive(Debug, Deserialize)]
struct TrainingResponse {
    status: TrainingStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    face_id: &'a str,
    person_id: &'a str,
    person_group_id: &'a str,
}

impl DetectResponse {
    fn into_detected_face(self) -> DetectedFace {
        let (age, gender) = match self.face_attributes {
            Some(attrs) => (
                attrs.age.unwrap_or_default(),
                attrs.gender.as_deref().map(Gender::parse).unwrap_or(Gender::Unknown),
            ),
            None => (0.0, Gender::Unknown),
        };

        DetectedFace {
            face_id: self.face_id.unwrap_or_default(),
            age,
            gender,
        }
    }
}

impl FaceClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: std::time::Duration) -> Self {
        Self {
            agent: agent(timeout),
            base_url: format!("{}/face/v1.0", endpoint.trim_end_matches('/')),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let key = config.require_key("face")?;
        Ok(Self::new(&config.endpoint, key, config.timeout()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &self.url(path))
            .set(KEY_HEADER, &self.api_key)
    }
}

#[async_trait]
impl FaceDetector for FaceClient {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>> {
        let client = self.clone();
        let image = image.to_vec();

        run_blocking("detect", move || {
            let faces: Vec<DetectResponse> = client
                .request("POST", "detect")
                .query("returnFaceId", "true")
                .query("returnFaceLandmarks", "false")
                .query("returnFaceAttributes", "age,gender")
                .set("Content-Type", "application/octet-stream")
                .send_bytes(&image)
                .map_err(|e| http_error("detect", e))?
                .into_json()
                .map_err(|e| FinderError::service("detect", e))?;

            Ok(faces.into_iter().map(DetectResponse::into_detected_face).collect())
        })
        .await
    }
}

#[async_trait]
impl PersonGroupService for FaceClient {
    async fn list_groups(&self) -> Result<Vec<PersonGroup>> {
        let client = self.clone();
        run_blocking("list_groups", move || {
            client
                .request("GET", "persongroups")
                .call()
                .map_err(|e| http_error("list_groups", e))?
                .into_json()
                .map_err(|e| FinderError::service("list_groups", e))
        })
        .await
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<PersonGroup>> {
        let client = self.clone();
        let path = format!("persongroups/{}", group_id);
        run_blocking("get_group", move || {
            match client.request("GET", &path).call() {
                Ok(response) => response
                    .into_json()
                    .map(Some)
                    .map_err(|e| FinderError::service("get_group", e)),
                Err(ureq::Error::Status(404, _)) => Ok(None),
                Err(e) => Err(http_error("get_group", e)),
            }
        })
        .await
    }

    async fn create_group(&self, group_id: &str, name: &str) -> Result<()> {
        let client = self.clone();
        let path = format!("persongroups/{}", group_id);
        let name = name.to_string();
        run_blocking("create_group", move || {
            client
                .request("PUT", &path)
                .send_json(NameRequest { name: &name })
                .map_err(|e| http_error("create_group", e))?;
            Ok(())
        })
        .await
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        let client = self.clone();
        let path = format!("persongroups/{}", group_id);
        run_blocking("delete_group", move || {
            client
                .request("DELETE", &path)
                .call()
                .map_err(|e| http_error("delete_group", e))?;
            Ok(())
        })
        .await
    }

    async fn list_persons(&self, group_id: &str) -> Result<Vec<Person>> {
        let client = self.clone();
        let path = format!("persongroups/{}/persons", group_id);
        run_blocking("list_persons", move || {
            client
                .request("GET", &path)
                .call()
                .map_err(|e| http_error("list_persons", e))?
                .into_json()
                .map_err(|e| FinderError::service("list_persons", e))
        })
        .await
    }

    async fn create_person(&self, group_id: &str, name: &str) -> Result<Person> {
        let client = self.clone();
        let path = format!("persongroups/{}/persons", group_id);
        let name = name.to_string();
        run_blocking("create_person", move || {
            let created: CreatePersonResponse = client
                .request("POST", &path)
                .send_json(NameRequest { name: &name })
                .map_err(|e| http_error("create_person", e))?
                .into_json()
                .map_err(|e| FinderError::service("create_person", e))?;

            Ok(Person {
                person_id: created.person_id,
                name,
                persisted_face_ids: Vec::new(),
            })
        })
        .await
    }

    async fn add_face(
        &self,
        group_id: &str,
        person_id: &str,
        image: &[u8],
        user_data: &str,
    ) -> Result<String> {
        let client = self.clone();
        let path = format!("persongroups/{}/persons/{}/persistedFaces", group_id, person_id);
        let image = image.to_vec();
        let user_data = user_data.to_string();
        run_blocking("add_face", move || {
            let added: AddFaceResponse = client
                .request("POST", &path)
                .query("userData", &user_data)
                .set("Content-Type", "application/octet-stream")
                .send_bytes(&image)
                .map_err(|e| http_error("add_face", e))?
                .into_json()
                .map_err(|e| FinderError::service("add_face", e))?;
            Ok(added.persisted_face_id)
        })
        .await
    }

    async fn get_face(
        &self,
        group_id: &str,
        person_id: &str,
        face_id: &str,
    ) -> Result<PersistedFace> {
        let client = self.clone();
        let path = format!(
            "persongroups/{}/persons/{}/persistedFaces/{}",
            group_id, person_id, face_id
        );
        run_blocking("get_face", move || {
            client
                .request("GET", &path)
                .call()
                .map_err(|e| http_error("get_face", e))?
                .into_json()
                .map_err(|e| FinderError::service("get_face", e))
        })
        .await
    }

    async fn delete_face(&self, group_id: &str, person_id: &str, face_id: &str) -> Result<()> {
        let client = self.clone();
        let path = format!(
            "persongroups/{}/persons/{}/persistedFaces/{}",
            group_id, person_id, face_id
        );
        run_blocking("delete_face", move || {
            client
                .request("DELETE", &path)
                .call()
                .map_err(|e| http_error("delete_face", e))?;
            Ok(())
        })
        .await
    }

    async fn train(&self, group_id: &str) -> Result<()> {
        let client = self.clone();
        let path = format!("persongroups/{}/train", group_id);
        run_blocking("train", move || {
            client
                .request("POST", &path)
                .call()
                .map_err(|e| http_error("train", e))?;
            Ok(())
        })
        .await
    }

    async fn training_status(&self, group_id: &str) -> Result<TrainingStatus> {
        let client = self.clone();
        let path = format!("persongroups/{}/training", group_id);
        run_blocking("training_status", move || {
            match client.request("GET", &path).call() {
                Ok(response) => {
                    let training: TrainingResponse = response
                        .into_json()
                        .map_err(|e| FinderError::service("training_status", e))?;
                    Ok(training.status)
                }
                // A group that was never trained has no training record.
                Err(ureq::Error::Status(404, _)) => Ok(TrainingStatus::NotStarted),
                Err(e) => Err(http_error("training_status", e)),
            }
        })
        .await
    }

    async fn verify(
        &self,
        face_id: &str,
        person_id: &str,
        group_id: &str,
    ) -> Result<VerifyOutcome> {
        let client = self.clone();
        let face_id = face_id.to_string();
        let person_id = person_id.to_string();
        let group_id = group_id.to_string();
        run_blocking("verify", move || {
            client
                .request("POST", "verify")
                .send_json(VerifyRequest {
                    face_id: &face_id,
                    person_id: &person_id,
                    person_group_id: &group_id,
                })
                .map_err(|e| http_error("verify", e))?
                .into_json()
                .map_err(|e| FinderError::service("verify", e))
        })
        .await
    }
}
