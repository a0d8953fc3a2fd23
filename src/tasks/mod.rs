//! Progress reporting and cancellation for a running search.
//!
//! The pipeline sends [`TaskUpdate`]s over a channel; whoever presents the
//! search holds the matching [`SearchTask`] and decides how to render them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::pipeline::{ImageRecord, SearchCounters};

/// Progress information for a search.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    pub counters: SearchCounters,
    pub total: usize,
    pub current_item: Option<String>,
}

impl TaskProgress {
    pub fn new(counters: SearchCounters, total: usize) -> Self {
        Self {
            counters,
            total,
            current_item: None,
        }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.current_item = Some(item.into());
        self
    }

    /// Calculate progress percentage (0-100).
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.counters.processed as f64 / self.total as f64) * 100.0).min(100.0) as u8
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Cancelled,
    Failed(String),
}

/// Update messages sent from a running search.
#[derive(Debug, Clone)]
pub enum TaskUpdate {
    /// Search has started with total files to process.
    Started { total: usize },
    /// A file is about to be processed.
    Progress(TaskProgress),
    /// A result was added, in file order.
    Matched(ImageRecord),
    Completed { message: String },
    Cancelled,
    /// The run stopped at `file_name`.
    Failed { file_name: String, error: String },
}

/// A search in flight: its state, latest progress and cancel flag.
pub struct SearchTask {
    pub state: TaskState,
    pub progress: Option<TaskProgress>,
    pub cancel_flag: Arc<AtomicBool>,
    receiver: mpsc::UnboundedReceiver<TaskUpdate>,
    started_at: Instant,
}

impl SearchTask {
    /// Create a task and the sender the pipeline reports through.
    pub fn new() -> (Self, mpsc::UnboundedSender<TaskUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = Self {
            state: TaskState::Running,
            progress: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            receiver: rx,
            started_at: Instant::now(),
        };
        (task, tx)
    }

    /// Request cancellation. Takes effect before the next file.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Wait for the next update and apply it. `None` once every sender is gone.
    pub async fn next_update(&mut self) -> Option<TaskUpdate> {
        let update = self.receiver.recv().await?;
        self.apply(&update);
        Some(update)
    }

    fn apply(&mut self, update: &TaskUpdate) {
        match update {
            TaskUpdate::Started { total } => {
                self.progress = Some(TaskProgress::new(SearchCounters::default(), *total));
            }
            TaskUpdate::Progress(progress) => {
                self.progress = Some(progress.clone());
            }
            TaskUpdate::Matched(_) => {}
            TaskUpdate::Completed { .. } => self.state = TaskState::Completed,
            TaskUpdate::Cancelled => self.state = TaskState::Cancelled,
            TaskUpdate::Failed { file_name, error } => {
                self.state = TaskState::Failed(format!("{}: {}", file_name, error));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let counters = SearchCounters {
            processed: 1,
            ..Default::default()
        };
        assert_eq!(TaskProgress::new(counters, 4).percent(), 25);
        assert_eq!(TaskProgress::new(counters, 0).percent(), 0);
    }

    #[tokio::test]
    async fn test_updates_drive_state() {
        let (mut task, tx) = SearchTask::new();
        assert_eq!(task.state, TaskState::Running);

        tx.send(TaskUpdate::Started { total: 3 }).unwrap();
        tx.send(TaskUpdate::Progress(
            TaskProgress::new(
                SearchCounters {
                    processed: 1,
                    ..Default::default()
                },
                3,
            )
            .with_item("a.jpg"),
        ))
        .unwrap();

        assert!(matches!(
            task.next_update().await,
            Some(TaskUpdate::Started { total: 3 })
        ));
        assert_eq!(task.progress.as_ref().map(|p| p.total), Some(3));

        assert!(matches!(task.next_update().await, Some(TaskUpdate::Progress(_))));
        let progress = task.progress.clone().unwrap();
        assert_eq!(progress.current_item.as_deref(), Some("a.jpg"));
        assert_eq!(task.state, TaskState::Running);

        tx.send(TaskUpdate::Failed {
            file_name: "b.jpg".to_string(),
            error: "detect failed".to_string(),
        })
        .unwrap();
        drop(tx);

        assert!(matches!(
            task.next_update().await,
            Some(TaskUpdate::Failed { .. })
        ));
        assert_eq!(task.state, TaskState::Failed("b.jpg: detect failed".to_string()));
        assert!(task.next_update().await.is_none());
    }

    #[test]
    fn test_cancel_sets_flag() {
        let (task, _tx) = SearchTask::new();
        let flag = task.cancel_flag.clone();
        task.cancel();
        assert!(flag.load(Ordering::SeqCst));
    }
}
