//! Parser Backend Module
//!
//! Contract for the remote service that downloads, transcribes and translates
//! submitted videos, with an HTTP implementation and an in-memory mock.

mod address;
mod http;
mod mock;

pub use address::*;
pub use http::*;
pub use mock::*;

use async_trait::async_trait;

use crate::core::subtitles::CourseDetail;
use crate::core::tasks::{StatusSnapshot, Task};
use crate::core::{CoreResult, TaskId};

/// Remote processing service consumed by the task controller and viewer
#[async_trait]
pub trait ParserBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Submits a source link for processing and returns the new task id
    async fn analyze(&self, url: &str) -> CoreResult<TaskId>;

    /// Fetches the latest status of one task
    async fn task_status(&self, task_id: &str) -> CoreResult<StatusSnapshot>;

    /// Fetches every task the backend knows about
    async fn list_tasks(&self) -> CoreResult<Vec<Task>>;

    async fn delete_task(&self, task_id: &str) -> CoreResult<()>;

    /// Removes every failed task
    async fn delete_failed_tasks(&self) -> CoreResult<()>;

    /// Fetches the playable content of a processed video
    async fn course_detail(&self, video_id: &str) -> CoreResult<CourseDetail>;
}
