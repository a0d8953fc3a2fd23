//! The reference person: one named subject whose sample faces are trained
//! remotely and used to verify faces found during a search.
//!
//! Each subject lives in its own person group (`ff-<canonical name>`) that
//! holds exactly one person. Every persisted face carries the path of the
//! image it came from, which is how samples are replayed and de-duplicated.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::config::TrainingConfig;
use crate::error::{FinderError, Result};
use crate::services::{Person, PersonGroupService, TrainingStatus};

/// Prefix of every group id created by this tool.
pub const GROUP_PREFIX: &str = "ff-";

/// Remote limit on person group id length.
const MAX_GROUP_ID_LEN: usize = 64;

/// Lowercased name with all whitespace removed, or `None` if nothing is left.
pub fn canonical_name(name: &str) -> Option<String> {
    let canonical: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    if canonical.is_empty() {
        None
    } else {
        Some(canonical)
    }
}

/// Length of the name hash appended when characters had to be dropped.
const NAME_HASH_LEN: usize = 8;

/// Deterministic group id for a subject name.
///
/// The id keeps only `[a-z0-9_-]` and is capped at the service's length
/// limit. When any character is dropped, a hash of the full canonical name
/// is appended so that names differing only in those characters stay apart.
pub fn subject_id(name: &str) -> Option<String> {
    let canonical = canonical_name(name)?;
    let mut safe: String = canonical
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .collect();

    if safe == canonical {
        let mut id = format!("{}{}", GROUP_PREFIX, safe);
        id.truncate(MAX_GROUP_ID_LEN);
        return Some(id);
    }

    let mut hash = format!("{:x}", Sha256::digest(canonical.as_bytes()));
    hash.truncate(NAME_HASH_LEN);

    if safe.is_empty() {
        return Some(format!("{}{}", GROUP_PREFIX, hash));
    }

    // Room for the prefix, a separator and the hash.
    safe.truncate(MAX_GROUP_ID_LEN - GROUP_PREFIX.len() - 1 - NAME_HASH_LEN);
    Some(format!("{}{}-{}", GROUP_PREFIX, safe, hash))
}

/// A persisted face and the image file it was created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFaceRef {
    pub face_id: String,
    pub source: PathBuf,
}

/// Local view of the subject's remote state.
///
/// Trained only when it holds at least one face and the last training run
/// succeeded.
#[derive(Debug, Clone)]
pub struct ReferenceSubject {
    group_id: String,
    person_id: String,
    name: String,
    faces: Vec<PersistedFaceRef>,
    trained: bool,
}

impl ReferenceSubject {
    fn new(group_id: String, person: Person) -> Self {
        Self {
            group_id,
            person_id: person.person_id,
            name: person.name,
            faces: Vec::new(),
            trained: false,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn person_id(&self) -> &str {
        &self.person_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn faces(&self) -> &[PersistedFaceRef] {
        &self.faces
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn has_source(&self, path: &Path) -> bool {
        self.faces.iter().any(|face| face.source == path)
    }

    fn record_training(&mut self, status: TrainingStatus) {
        self.trained = status == TrainingStatus::Succeeded && !self.faces.is_empty();
    }
}

/// Result of verifying a detected face against the subject.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub is_match: bool,
    pub confidence: f64,
}

impl Verification {
    fn rejected() -> Self {
        Self {
            is_match: false,
            confidence: 0.0,
        }
    }
}

/// How training completion is awaited.
#[derive(Debug, Clone, Copy)]
pub struct TrainingPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl From<&TrainingConfig> for TrainingPolicy {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }
}

impl Default for TrainingPolicy {
    fn default() -> Self {
        TrainingPolicy::from(&TrainingConfig::default())
    }
}

pub struct ReferenceManager {
    service: Arc<dyn PersonGroupService>,
    policy: TrainingPolicy,
}

impl ReferenceManager {
    pub fn new(service: Arc<dyn PersonGroupService>, policy: TrainingPolicy) -> Self {
        Self { service, policy }
    }

    /// Load the named subject, creating it if it does not exist yet.
    ///
    /// Returns `None` for a blank name. Existing persisted faces are
    /// resolved back to their source paths; faces whose file is gone are
    /// deleted remotely.
    pub async fn locate_or_create(&self, name: &str) -> Result<Option<ReferenceSubject>> {
        let Some(group_id) = subject_id(name) else {
            tracing::debug!(name, "Ignoring blank subject name");
            return Ok(None);
        };
        let display_name = name.trim();

        if self.service.get_group(&group_id).await?.is_none() {
            return self.create(&group_id, display_name).await.map(Some);
        }

        let persons = self.service.list_persons(&group_id).await?;
        let Some(person) = persons.into_iter().next() else {
            tracing::warn!(group = %group_id, "Subject group has no person, recreating");
            self.service.delete_group(&group_id).await?;
            return self.create(&group_id, display_name).await.map(Some);
        };

        self.load(group_id, person).await.map(Some)
    }

    async fn create(&self, group_id: &str, name: &str) -> Result<ReferenceSubject> {
        self.service.create_group(group_id, name).await?;
        let person = self.service.create_person(group_id, name).await?;

        tracing::info!(group = %group_id, name, "Created reference subject");
        Ok(ReferenceSubject::new(group_id.to_string(), person))
    }

    async fn load(&self, group_id: String, person: Person) -> Result<ReferenceSubject> {
        let face_ids = person.persisted_face_ids.clone();
        let mut subject = ReferenceSubject::new(group_id, person);

        for face_id in face_ids {
            let face = self
                .service
                .get_face(&subject.group_id, &subject.person_id, &face_id)
                .await?;

            let Some(source) = face.user_data.filter(|data| !data.is_empty()) else {
                continue;
            };
            let source = PathBuf::from(source);

            if !source.exists() {
                tracing::info!(path = %source.display(), "Sample image missing, deleting face");
                self.service
                    .delete_face(&subject.group_id, &subject.person_id, &face_id)
                    .await?;
                continue;
            }

            subject.faces.push(PersistedFaceRef { face_id, source });
        }

        if !subject.faces.is_empty() {
            let status = self.service.training_status(&subject.group_id).await?;
            subject.record_training(status);
        }

        tracing::info!(
            group = %subject.group_id,
            faces = subject.faces.len(),
            trained = subject.trained,
            "Loaded reference subject"
        );
        Ok(subject)
    }

    /// Every subject created by this tool, by display name.
    pub async fn list_subjects(&self) -> Result<Vec<String>> {
        let groups = self.service.list_groups().await?;
        Ok(groups
            .into_iter()
            .filter(|group| group.person_group_id.starts_with(GROUP_PREFIX))
            .map(|group| group.name)
            .collect())
    }

    /// Add sample faces and retrain if anything new was added.
    ///
    /// Paths already attached are skipped. Uploading stops at the first
    /// unreadable or rejected file, but faces stored before it are still
    /// trained and that error is returned afterwards. A subject that holds
    /// faces but is not trained is retrained even when nothing is new.
    /// Returns whether the subject is trained afterwards.
    pub async fn attach_faces(
        &self,
        subject: &mut ReferenceSubject,
        paths: &[PathBuf],
    ) -> Result<bool> {
        let mut added = 0;
        let mut upload_error = None;

        for path in paths {
            if subject.has_source(path) {
                tracing::debug!(path = %path.display(), "Face already attached");
                continue;
            }

            match self.upload_face(subject, path).await {
                Ok(face_id) => {
                    subject.faces.push(PersistedFaceRef {
                        face_id,
                        source: path.clone(),
                    });
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to attach face");
                    upload_error = Some(e);
                    break;
                }
            }
        }

        let needs_training = added > 0 || (!subject.faces.is_empty() && !subject.trained);
        if needs_training {
            tracing::info!(group = %subject.group_id, added, "Training reference subject");
            subject.trained = false;

            if let Err(e) = self.train(subject).await {
                return Err(upload_error.unwrap_or(e));
            }
        }

        match upload_error {
            Some(e) => Err(e),
            None => Ok(subject.trained),
        }
    }

    async fn upload_face(&self, subject: &ReferenceSubject, path: &Path) -> Result<String> {
        let image = tokio::fs::read(path)
            .await
            .map_err(|e| FinderError::filesystem(path, e))?;

        self.service
            .add_face(
                &subject.group_id,
                &subject.person_id,
                &image,
                &path.to_string_lossy(),
            )
            .await
    }

    async fn train(&self, subject: &mut ReferenceSubject) -> Result<()> {
        self.service.train(&subject.group_id).await?;
        let status = self.wait_for_training(&subject.group_id).await?;
        subject.record_training(status);
        Ok(())
    }

    /// Poll until the training run finishes or the policy deadline passes.
    async fn wait_for_training(&self, group_id: &str) -> Result<TrainingStatus> {
        let started = Instant::now();

        loop {
            let status = self.service.training_status(group_id).await?;
            if status.is_finished() {
                tracing::info!(group = %group_id, ?status, "Training finished");
                return Ok(status);
            }

            let waited = started.elapsed();
            if waited >= self.policy.timeout {
                return Err(FinderError::TrainingTimeout {
                    group_id: group_id.to_string(),
                    waited,
                });
            }

            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    /// Check whether a detected face belongs to the subject.
    ///
    /// Without a face id or an active subject this is a non-match and no
    /// remote call is made. The service decides the match threshold.
    pub async fn verify(
        &self,
        face_id: &str,
        subject: Option<&ReferenceSubject>,
    ) -> Result<Verification> {
        let Some(subject) = subject else {
            return Ok(Verification::rejected());
        };
        if face_id.is_empty() {
            return Ok(Verification::rejected());
        }

        let outcome = self
            .service
            .verify(face_id, &subject.person_id, &subject.group_id)
            .await?;

        Ok(Verification {
            is_match: outcome.is_identical,
            confidence: outcome.confidence,
        })
    }

    /// Delete a subject and all of its faces. Clears `active` if it was that subject.
    pub async fn delete_subject(
        &self,
        active: &mut Option<ReferenceSubject>,
        group_id: &str,
    ) -> Result<()> {
        self.service.delete_group(group_id).await?;

        if active.as_ref().is_some_and(|s| s.group_id == group_id) {
            *active = None;
        }

        tracing::info!(group = %group_id, "Deleted reference subject");
        Ok(())
    }
}
