//! In-memory service doubles for unit tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    FaceDetector, Person, PersonGroup, PersonGroupService, PersistedFace, TextRegion,
    TrainingStatus, VerifyOutcome, VisionService,
};
use crate::error::{FinderError, Result};
use crate::faces::{DetectedFace, Gender};

pub(crate) fn face(id: &str, age: f64, gender: Gender) -> DetectedFace {
    DetectedFace {
        face_id: id.to_string(),
        age,
        gender,
    }
}

/// Detector keyed by image content: tests write a short label into each file.
#[derive(Default)]
pub(crate) struct FakeDetector {
    faces: HashMap<Vec<u8>, Vec<DetectedFace>>,
    failing: HashSet<Vec<u8>>,
    cancel_on: Option<(Vec<u8>, Arc<AtomicBool>)>,
    calls: AtomicUsize,
}

impl FakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faces(mut self, content: &str, faces: Vec<DetectedFace>) -> Self {
        self.faces.insert(content.as_bytes().to_vec(), faces);
        self
    }

    pub fn failing_on(mut self, content: &str) -> Self {
        self.failing.insert(content.as_bytes().to_vec());
        self
    }

    /// Raise `flag` while detecting `content`, as a user pressing cancel mid-file would.
    pub fn cancelling_on(mut self, content: &str, flag: Arc<AtomicBool>) -> Self {
        self.cancel_on = Some((content.as_bytes().to_vec(), flag));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for FakeDetector {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((content, flag)) = &self.cancel_on {
            if content.as_slice() == image {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if self.failing.contains(image) {
            return Err(FinderError::service("detect", "HTTP 500: boom"));
        }
        Ok(self.faces.get(image).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub(crate) struct FakeVision {
    pub captions: Vec<String>,
    pub regions: Vec<TextRegion>,
    pub fail_thumbnail: bool,
    pub fail_caption: bool,
    pub fail_text: bool,
    pub calls: AtomicUsize,
}

impl FakeVision {
    fn call(&self, fail: bool, operation: &'static str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if fail {
            Err(FinderError::service(operation, "HTTP 503: unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VisionService for FakeVision {
    async fn thumbnail(&self, width: u32, height: u32, image: &[u8]) -> Result<Vec<u8>> {
        self.call(self.fail_thumbnail, "thumbnail")?;
        let mut bytes = format!("thumb {}x{} ", width, height).into_bytes();
        bytes.extend_from_slice(image);
        Ok(bytes)
    }

    async fn describe(&self, _image: &[u8]) -> Result<Vec<String>> {
        self.call(self.fail_caption, "describe")?;
        Ok(self.captions.clone())
    }

    async fn recognize_text(&self, _image: &[u8]) -> Result<Vec<TextRegion>> {
        self.call(self.fail_text, "recognize_text")?;
        Ok(self.regions.clone())
    }
}

struct FakePerson {
    person_id: String,
    name: String,
    faces: Vec<(String, String)>,
}

struct FakeGroup {
    name: String,
    persons: Vec<FakePerson>,
    status: TrainingStatus,
}

#[derive(Default)]
struct FakeState {
    groups: BTreeMap<String, FakeGroup>,
    next_id: usize,
    training_script: VecDeque<TrainingStatus>,
    final_status: Option<TrainingStatus>,
    train_calls: usize,
    verify: HashMap<String, VerifyOutcome>,
    verify_calls: usize,
    deleted_faces: Vec<String>,
    failing: HashSet<&'static str>,
}

impl FakeState {
    fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing.contains(operation) {
            Err(FinderError::service(operation, "HTTP 500: injected"))
        } else {
            Ok(())
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn group(&mut self, operation: &'static str, group_id: &str) -> Result<&mut FakeGroup> {
        self.groups
            .get_mut(group_id)
            .ok_or_else(|| FinderError::service(operation, "HTTP 404: group not found"))
    }

    fn person(
        &mut self,
        operation: &'static str,
        group_id: &str,
        person_id: &str,
    ) -> Result<&mut FakePerson> {
        self.group(operation, group_id)?
            .persons
            .iter_mut()
            .find(|p| p.person_id == person_id)
            .ok_or_else(|| FinderError::service(operation, "HTTP 404: person not found"))
    }
}

/// Person-group service backed by a map. Training runs follow a script of
/// statuses, then settle on the final status (succeeded unless set).
#[derive(Default)]
pub(crate) struct FakePersonGroups {
    state: Mutex<FakeState>,
}

impl FakePersonGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an existing group with one person and the given (face id, user data) pairs.
    pub fn seed(
        &self,
        group_id: &str,
        name: &str,
        faces: &[(&str, &str)],
        status: TrainingStatus,
    ) {
        let mut state = self.state.lock().unwrap();
        state.groups.insert(
            group_id.to_string(),
            FakeGroup {
                name: name.to_string(),
                persons: vec![FakePerson {
                    person_id: format!("{}-person", group_id),
                    name: name.to_string(),
                    faces: faces
                        .iter()
                        .map(|(id, data)| (id.to_string(), data.to_string()))
                        .collect(),
                }],
                status,
            },
        );
    }

    /// Add a group that holds no person entity.
    pub fn seed_empty_group(&self, group_id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.groups.insert(
            group_id.to_string(),
            FakeGroup {
                name: name.to_string(),
                persons: Vec::new(),
                status: TrainingStatus::NotStarted,
            },
        );
    }

    pub fn script_training(&self, polls: Vec<TrainingStatus>, final_status: TrainingStatus) {
        let mut state = self.state.lock().unwrap();
        state.training_script = polls.into();
        state.final_status = Some(final_status);
    }

    pub fn set_verify(&self, face_id: &str, is_identical: bool, confidence: f64) {
        self.state.lock().unwrap().verify.insert(
            face_id.to_string(),
            VerifyOutcome {
                is_identical,
                confidence,
            },
        );
    }

    pub fn fail(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn has_group(&self, group_id: &str) -> bool {
        self.state.lock().unwrap().groups.contains_key(group_id)
    }

    pub fn person_count(&self, group_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(group_id)
            .map(|g| g.persons.len())
            .unwrap_or_default()
    }

    pub fn face_sources(&self, group_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(group_id)
            .map(|g| {
                g.persons
                    .iter()
                    .flat_map(|p| p.faces.iter().map(|(_, data)| data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn train_calls(&self) -> usize {
        self.state.lock().unwrap().train_calls
    }

    pub fn verify_calls(&self) -> usize {
        self.state.lock().unwrap().verify_calls
    }

    pub fn deleted_faces(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_faces.clone()
    }
}

#[async_trait]
impl PersonGroupService for FakePersonGroups {
    async fn list_groups(&self) -> Result<Vec<PersonGroup>> {
        let state = self.state.lock().unwrap();
        state.check("list_groups")?;
        Ok(state
            .groups
            .iter()
            .map(|(id, group)| PersonGroup {
                person_group_id: id.clone(),
                name: group.name.clone(),
                user_data: None,
            })
            .collect())
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<PersonGroup>> {
        let state = self.state.lock().unwrap();
        state.check("get_group")?;
        Ok(state.groups.get(group_id).map(|group| PersonGroup {
            person_group_id: group_id.to_string(),
            name: group.name.clone(),
            user_data: None,
        }))
    }

    async fn create_group(&self, group_id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check("create_group")?;
        state.groups.insert(
            group_id.to_string(),
            FakeGroup {
                name: name.to_string(),
                persons: Vec::new(),
                status: TrainingStatus::NotStarted,
            },
        );
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check("delete_group")?;
        state
            .groups
            .remove(group_id)
            .map(|_| ())
            .ok_or_else(|| FinderError::service("delete_group", "HTTP 404: group not found"))
    }

    async fn list_persons(&self, group_id: &str) -> Result<Vec<Person>> {
        let mut state = self.state.lock().unwrap();
        state.check("list_persons")?;
        Ok(state
            .group("list_persons", group_id)?
            .persons
            .iter()
            .map(|p| Person {
                person_id: p.person_id.clone(),
                name: p.name.clone(),
                persisted_face_ids: p.faces.iter().map(|(id, _)| id.clone()).collect(),
            })
            .collect())
    }

    async fn create_person(&self, group_id: &str, name: &str) -> Result<Person> {
        let mut state = self.state.lock().unwrap();
        state.check("create_person")?;
        let person_id = state.next_id("person");
        state.group("create_person", group_id)?.persons.push(FakePerson {
            person_id: person_id.clone(),
            name: name.to_string(),
            faces: Vec::new(),
        });
        Ok(Person {
            person_id,
            name: name.to_string(),
            persisted_face_ids: Vec::new(),
        })
    }

    async fn add_face(
        &self,
        group_id: &str,
        person_id: &str,
        _image: &[u8],
        user_data: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.check("add_face")?;
        let face_id = state.next_id("face");
        state
            .person("add_face", group_id, person_id)?
            .faces
            .push((face_id.clone(), user_data.to_string()));
        Ok(face_id)
    }

    async fn get_face(
        &self,
        group_id: &str,
        person_id: &str,
        face_id: &str,
    ) -> Result<PersistedFace> {
        let mut state = self.state.lock().unwrap();
        state.check("get_face")?;
        state
            .person("get_face", group_id, person_id)?
            .faces
            .iter()
            .find(|(id, _)| id == face_id)
            .map(|(id, data)| PersistedFace {
                persisted_face_id: id.clone(),
                user_data: Some(data.clone()),
            })
            .ok_or_else(|| FinderError::service("get_face", "HTTP 404: face not found"))
    }

    async fn delete_face(&self, group_id: &str, person_id: &str, face_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check("delete_face")?;
        state
            .person("delete_face", group_id, person_id)?
            .faces
            .retain(|(id, _)| id != face_id);
        state.deleted_faces.push(face_id.to_string());
        Ok(())
    }

    async fn train(&self, group_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check("train")?;
        state.train_calls += 1;
        state.group("train", group_id)?.status = TrainingStatus::Running;
        Ok(())
    }

    async fn training_status(&self, group_id: &str) -> Result<TrainingStatus> {
        let mut state = self.state.lock().unwrap();
        state.check("training_status")?;
        let current = state.group("training_status", group_id)?.status;
        if current != TrainingStatus::Running {
            return Ok(current);
        }

        let next = match state.training_script.pop_front() {
            Some(status) => status,
            None => state.final_status.unwrap_or(TrainingStatus::Succeeded),
        };
        state.group("training_status", group_id)?.status = next;
        Ok(next)
    }

    async fn verify(
        &self,
        face_id: &str,
        _person_id: &str,
        _group_id: &str,
    ) -> Result<VerifyOutcome> {
        let mut state = self.state.lock().unwrap();
        state.check("verify")?;
        state.verify_calls += 1;
        Ok(state.verify.get(face_id).copied().unwrap_or(VerifyOutcome {
            is_identical: false,
            confidence: 0.1,
        }))
    }
}
