//! Task Lifecycle Module
//!
//! Tracks backend processing tasks from submission to a terminal state.
//! The controller owns the task set; pollers feed status back into it.

mod controller;
mod poller;

pub use controller::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{EpochMillis, TaskId, VideoId};

// =============================================================================
// Task Status
// =============================================================================

/// Task status as reported by the backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, not yet started
    #[default]
    Pending,
    /// Downloading, transcribing or translating
    Processing,
    /// Finished; a video id is available
    Completed,
    /// Finished with an error
    Failed,
}

impl TaskStatus {
    /// Maps a backend status string, tolerating the aliases some deployments use.
    pub fn from_wire(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "pending" | "queued" => TaskStatus::Pending,
            "processing" | "running" => TaskStatus::Processing,
            "completed" | "succeeded" => TaskStatus::Completed,
            "failed" | "error" => TaskStatus::Failed,
            other => {
                warn!("Unknown task status '{}', treating as processing", other);
                TaskStatus::Processing
            }
        }
    }

    /// Terminal states are never polled again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Short human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Status Snapshot
// =============================================================================

/// Result of a single status poll
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: TaskStatus,
    pub progress: u8,
    pub video_id: Option<VideoId>,
    pub error: Option<String>,
}

impl StatusSnapshot {
    pub fn new(status: TaskStatus, progress: u8) -> Self {
        Self {
            status,
            progress: clamp_progress(progress as f64),
            video_id: None,
            error: None,
        }
    }

    /// Completed snapshot carrying the processed video id
    pub fn completed(video_id: impl Into<VideoId>) -> Self {
        Self {
            video_id: Some(video_id.into()),
            ..Self::new(TaskStatus::Completed, 100)
        }
    }

    /// Failed snapshot carrying the backend's error text
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(TaskStatus::Failed, 0)
        }
    }
}

/// Clamps a backend progress value into 0..=100.
pub fn clamp_progress(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

// =============================================================================
// Task
// =============================================================================

/// Backend-tracked unit of work turning a source link into a playable course
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Backend-assigned id
    pub task_id: TaskId,
    /// Submitted source link
    pub url: String,
    /// Display title resolved by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: TaskStatus,
    /// Percent complete (0-100)
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<VideoId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time, epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<EpochMillis>,
}

impl Task {
    /// Creates a pending task record
    pub fn new(task_id: impl Into<TaskId>, url: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            url: url.into(),
            title: None,
            status: TaskStatus::Pending,
            progress: 0,
            video_id: None,
            error: None,
            created_at: Some(Utc::now().timestamp_millis()),
        }
    }

    /// Sets the creation timestamp
    pub fn with_created_at(mut self, created_at: Option<EpochMillis>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Sets the display title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title when the backend resolved one, otherwise the source link
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => &self.url,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a poll result to this record
    pub fn apply_status(&mut self, snapshot: &StatusSnapshot) {
        self.status = snapshot.status;
        self.progress = snapshot.progress;
        if snapshot.video_id.is_some() {
            self.video_id = snapshot.video_id.clone();
        }
        self.error = snapshot.error.clone();
    }

    /// Current state of this record as a snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            progress: self.progress,
            video_id: self.video_id.clone(),
            error: self.error.clone(),
        }
    }

    /// Creation time as a UTC datetime
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

/// Orders tasks newest first. Tasks without a creation time sort as the
/// epoch; the sort is stable so arrival order breaks ties.
pub fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.unwrap_or(0).cmp(&a.created_at.unwrap_or(0)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_wire() {
        assert_eq!(TaskStatus::from_wire("pending"), TaskStatus::Pending);
        assert_eq!(TaskStatus::from_wire("PROCESSING"), TaskStatus::Processing);
        assert_eq!(TaskStatus::from_wire("completed"), TaskStatus::Completed);
        assert_eq!(TaskStatus::from_wire("failed"), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_wire("downloading"), TaskStatus::Processing);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_progress_clamped() {
        assert_eq!(clamp_progress(40.0), 40);
        assert_eq!(clamp_progress(140.0), 100);
        assert_eq!(clamp_progress(-3.0), 0);
        assert_eq!(clamp_progress(f64::NAN), 0);
    }

    #[test]
    fn test_apply_status_keeps_known_video_id() {
        let mut task = Task::new("T1", "https://youtu.be/abc");
        task.apply_status(&StatusSnapshot::completed("V1"));
        assert_eq!(task.video_id.as_deref(), Some("V1"));
        assert_eq!(task.progress, 100);

        // A later snapshot without a video id must not erase it
        task.apply_status(&StatusSnapshot::new(TaskStatus::Completed, 100));
        assert_eq!(task.video_id.as_deref(), Some("V1"));
    }

    #[test]
    fn test_display_title_falls_back_to_url() {
        let task = Task::new("T1", "https://youtu.be/abc");
        assert_eq!(task.display_title(), "https://youtu.be/abc");

        let titled = task.clone().with_title("Lecture 1");
        assert_eq!(titled.display_title(), "Lecture 1");

        let blank = task.with_title("  ");
        assert_eq!(blank.display_title(), "https://youtu.be/abc");
    }

    #[test]
    fn test_sort_newest_first_is_stable_for_missing_timestamps() {
        let mut tasks = vec![
            Task::new("a", "u").with_created_at(None),
            Task::new("b", "u").with_created_at(Some(1_000)),
            Task::new("c", "u").with_created_at(None),
            Task::new("d", "u").with_created_at(Some(3_000)),
        ];

        sort_newest_first(&mut tasks);

        let order: Vec<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn test_task_wire_shape() {
        let json = r#"{"taskId":"T1","url":"https://youtu.be/abc","status":"processing","progress":40,"createdAt":1700000000000}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.task_id, "T1");
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.progress, 40);
        assert!(task.created_at_utc().is_some());
    }
}
