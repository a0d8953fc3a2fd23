//! The search pipeline: detection, attribute filtering, optional person
//! verification and enrichment, one file at a time.

pub mod enrichment;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::SearchDefaults;
use crate::error::{FinderError, Result};
use crate::faces::{evaluate, DetectedFace, ReferenceManager, ReferenceSubject, SearchCriteria};
use crate::scanner::{extract_metadata, ThumbnailStore};
use crate::services::{FaceDetector, VisionService};
use crate::tasks::{TaskProgress, TaskUpdate};

pub use enrichment::Enricher;

/// Which optional steps run for each qualifying image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub thumbnail: bool,
    pub caption: bool,
    pub text: bool,
    pub metadata: bool,
    pub match_person: bool,
}

impl From<&SearchDefaults> for SearchOptions {
    fn from(defaults: &SearchDefaults) -> Self {
        Self {
            thumbnail: defaults.thumbnail,
            caption: defaults.caption,
            text: defaults.text,
            metadata: defaults.metadata,
            match_person: false,
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub file_name: String,
    /// `"<gender> <age>"` for each matched face.
    pub attributes: String,
    pub metadata: String,
    pub caption: String,
    pub text: String,
    pub thumbnail: Option<PathBuf>,
    pub confidence: Option<f64>,
}

impl ImageRecord {
    pub fn new(path: PathBuf, attributes: String) -> Self {
        Self {
            file_name: file_name(&path),
            path,
            attributes,
            metadata: String::new(),
            caption: String::new(),
            text: String::new(),
            thumbnail: None,
            confidence: None,
        }
    }
}

/// Running totals for one run. Only ever increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchCounters {
    /// Files whose detection was attempted.
    pub processed: usize,
    /// Files with at least one face.
    pub searched: usize,
    /// Files accepted by the attribute filter.
    pub qualifying: usize,
    /// Results kept after person verification.
    pub matched: usize,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// A file could not be read or detected; later files were not processed.
    Aborted {
        file_name: String,
        error: FinderError,
    },
}

/// Everything a run produced, in file order.
#[derive(Debug)]
pub struct RunReport {
    pub records: Vec<ImageRecord>,
    pub counters: SearchCounters,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            counters: SearchCounters::default(),
            outcome: RunOutcome::Completed,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }
}

pub struct SearchRequest<'a> {
    pub files: &'a [PathBuf],
    pub criteria: SearchCriteria,
    pub options: SearchOptions,
    /// Active reference subject, consulted when `options.match_person` is set.
    pub subject: Option<&'a ReferenceSubject>,
}

pub struct Pipeline {
    detector: Arc<dyn FaceDetector>,
    references: Arc<ReferenceManager>,
    enricher: Enricher,
}

enum Step {
    Skip,
    Keep(ImageRecord),
}

impl Pipeline {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        vision: Arc<dyn VisionService>,
        references: Arc<ReferenceManager>,
        thumbnails: ThumbnailStore,
    ) -> Self {
        Self {
            detector,
            references,
            enricher: Enricher::new(vision, thumbnails),
        }
    }

    /// Search `request.files` in order.
    ///
    /// Cancellation is checked before each file. A read or detection
    /// failure stops the run; results gathered so far are kept in the
    /// report. Each kept record is also sent as [`TaskUpdate::Matched`].
    pub async fn run(
        &self,
        request: SearchRequest<'_>,
        cancel: &AtomicBool,
        updates: Option<&UnboundedSender<TaskUpdate>>,
    ) -> RunReport {
        let mut report = RunReport::new();
        let total = request.files.len();

        if total == 0 {
            tracing::debug!("No files to search");
            notify(updates, TaskUpdate::Completed {
                message: "No images to search".to_string(),
            });
            return report;
        }

        tracing::info!(total, options = ?request.options, "Starting search");
        notify(updates, TaskUpdate::Started { total });

        for path in request.files {
            if cancel.load(Ordering::SeqCst) {
                tracing::info!(processed = report.counters.processed, "Search cancelled");
                report.outcome = RunOutcome::Cancelled;
                notify(updates, TaskUpdate::Cancelled);
                return report;
            }

            let name = file_name(path);
            report.counters.processed += 1;
            notify(
                updates,
                TaskUpdate::Progress(
                    TaskProgress::new(report.counters, total).with_item(name.clone()),
                ),
            );

            let step = match self.process(path, &request, &mut report.counters).await {
                Ok(step) => step,
                Err(error) => {
                    tracing::error!(file = %name, error = %error, "Search aborted");
                    notify(updates, TaskUpdate::Failed {
                        file_name: name.clone(),
                        error: error.to_string(),
                    });
                    report.outcome = RunOutcome::Aborted {
                        file_name: name,
                        error,
                    };
                    return report;
                }
            };

            if let Step::Keep(record) = step {
                report.records.push(record.clone());
                if request.options.match_person {
                    report.counters.matched = report.records.len();
                }
                notify(updates, TaskUpdate::Matched(record));
            }
        }

        tracing::info!(
            processed = report.counters.processed,
            searched = report.counters.searched,
            qualifying = report.counters.qualifying,
            results = report.records.len(),
            "Search finished"
        );
        notify(updates, TaskUpdate::Completed {
            message: format!(
                "{} of {} images matched",
                report.records.len(),
                report.counters.processed
            ),
        });
        report
    }

    /// Only errors that should stop the whole run are returned.
    async fn process(
        &self,
        path: &Path,
        request: &SearchRequest<'_>,
        counters: &mut SearchCounters,
    ) -> Result<Step> {
        let image = tokio::fs::read(path)
            .await
            .map_err(|e| FinderError::filesystem(path, e))?;

        let faces = self.detector.detect(&image).await?;
        if faces.is_empty() {
            tracing::debug!(path = %path.display(), "No faces");
            return Ok(Step::Skip);
        }
        counters.searched += 1;

        let verdict = evaluate(&faces, &request.criteria);
        if !verdict.accepted {
            tracing::debug!(path = %path.display(), faces = faces.len(), "No face passed the filter");
            return Ok(Step::Skip);
        }

        let mut record = ImageRecord::new(path.to_path_buf(), verdict.summary);
        if request.options.metadata {
            record.metadata = metadata_summary(path).await;
        }
        counters.qualifying += 1;

        if request.options.match_person {
            match request.subject.filter(|s| s.is_trained()) {
                Some(subject) => {
                    let Some(confidence) = self.verify(path, &verdict.matched, subject).await
                    else {
                        return Ok(Step::Skip);
                    };
                    record.confidence = Some(confidence);
                }
                None => {
                    tracing::debug!(path = %path.display(), "No trained subject, skipping verification");
                }
            }
        }

        self.enricher
            .enrich(&mut record, &image, &request.options)
            .await;

        Ok(Step::Keep(record))
    }

    /// Verify the first matched face. Returns the confidence on a match.
    async fn verify(
        &self,
        path: &Path,
        faces: &[DetectedFace],
        subject: &ReferenceSubject,
    ) -> Option<f64> {
        let face_id = faces.first().map(|f| f.face_id.as_str()).unwrap_or_default();

        match self.references.verify(face_id, Some(subject)).await {
            Ok(verification) if verification.is_match => Some(verification.confidence),
            Ok(verification) => {
                tracing::debug!(
                    path = %path.display(),
                    confidence = verification.confidence,
                    "Not the reference subject"
                );
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Verification failed");
                None
            }
        }
    }
}

async fn metadata_summary(path: &Path) -> String {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || extract_metadata(&owned)).await {
        Ok(Ok(metadata)) => metadata.summary(),
        Ok(Err(e)) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read metadata");
            String::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Metadata task failed");
            String::new()
        }
    }
}

fn notify(updates: Option<&UnboundedSender<TaskUpdate>>, update: TaskUpdate) {
    if let Some(tx) = updates {
        let _ = tx.send(update);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
