//! Mock Parser Backend
//!
//! In-memory backend with scripted status sequences and failure injection.
//! Used by tests and by offline demos of the viewer.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::backend::ParserBackend;
use crate::core::subtitles::CourseDetail;
use crate::core::tasks::{StatusSnapshot, Task, TaskStatus};
use crate::core::{CoreError, CoreResult, TaskId};

/// Backend operations that can be counted or made to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Analyze,
    Status,
    List,
    Delete,
    DeleteFailed,
    CourseDetail,
}

#[derive(Debug, Default)]
struct MockState {
    /// Tasks in insertion order
    tasks: Vec<Task>,
    /// Pending status results per task; the last one repeats
    scripts: HashMap<TaskId, VecDeque<StatusSnapshot>>,
    courses: HashMap<String, CourseDetail>,
    next_ids: VecDeque<TaskId>,
    failures: HashMap<MockOperation, VecDeque<CoreError>>,
    calls: HashMap<MockOperation, usize>,
    status_calls: HashMap<TaskId, usize>,
}

/// Mock backend for testing
#[derive(Debug, Default)]
pub struct MockParserBackend {
    state: Mutex<MockState>,
}

impl MockParserBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an existing task
    pub fn with_task(self, task: Task) -> Self {
        self.lock().tasks.push(task);
        self
    }

    /// Scripts the status results returned for `task_id`, in order. Once one
    /// result is left it is returned for every later poll.
    pub fn with_status_script(self, task_id: &str, script: Vec<StatusSnapshot>) -> Self {
        self.lock()
            .scripts
            .insert(task_id.to_string(), script.into_iter().collect());
        self
    }

    pub fn with_course(self, video_id: &str, detail: CourseDetail) -> Self {
        self.lock().courses.insert(video_id.to_string(), detail);
        self
    }

    /// Id handed out by the next `analyze`
    pub fn with_next_task_id(self, task_id: &str) -> Self {
        self.lock().next_ids.push_back(task_id.to_string());
        self
    }

    /// Makes the next `times` calls of `op` fail with a network error
    pub fn fail_next(&self, op: MockOperation, times: usize) {
        let mut state = self.lock();
        let queue = state.failures.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(CoreError::NetworkError(format!("simulated {:?} failure", op)));
        }
    }

    /// Number of calls made to `op`
    pub fn calls(&self, op: MockOperation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of status polls issued for one task
    pub fn status_calls(&self, task_id: &str) -> usize {
        self.lock().status_calls.get(task_id).copied().unwrap_or(0)
    }

    /// Current server-side copy of a task
    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.task_id == task_id).cloned()
    }

    /// Counts the call and pops an injected failure, if any
    fn enter(state: &mut MockState, op: MockOperation) -> CoreResult<()> {
        *state.calls.entry(op).or_insert(0) += 1;
        match state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ParserBackend for MockParserBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn analyze(&self, url: &str) -> CoreResult<TaskId> {
        let mut state = self.lock();
        Self::enter(&mut state, MockOperation::Analyze)?;

        if url.trim().is_empty() {
            return Err(CoreError::BackendError {
                status: 400,
                message: "URL is required".to_string(),
            });
        }

        // Same link already processed: reuse that task
        if let Some(existing) = state
            .tasks
            .iter()
            .find(|t| t.url == url && t.status == TaskStatus::Completed)
        {
            return Ok(existing.task_id.clone());
        }

        let task_id = match state.next_ids.pop_front() {
            Some(id) => id,
            None => ulid::Ulid::new().to_string(),
        };
        state.tasks.push(Task::new(task_id.clone(), url));
        Ok(task_id)
    }

    async fn task_status(&self, task_id: &str) -> CoreResult<StatusSnapshot> {
        let mut state = self.lock();
        Self::enter(&mut state, MockOperation::Status)?;
        *state.status_calls.entry(task_id.to_string()).or_insert(0) += 1;

        let scripted = state.scripts.get_mut(task_id).and_then(|script| {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        });

        let Some(task) = state.tasks.iter_mut().find(|t| t.task_id == task_id) else {
            return Ok(StatusSnapshot::failed("Task not found"));
        };

        if let Some(snapshot) = scripted {
            task.apply_status(&snapshot);
        }
        Ok(task.snapshot())
    }

    async fn list_tasks(&self) -> CoreResult<Vec<Task>> {
        let mut state = self.lock();
        Self::enter(&mut state, MockOperation::List)?;
        Ok(state.tasks.clone())
    }

    async fn delete_task(&self, task_id: &str) -> CoreResult<()> {
        let mut state = self.lock();
        Self::enter(&mut state, MockOperation::Delete)?;
        state.tasks.retain(|t| t.task_id != task_id);
        state.scripts.remove(task_id);
        Ok(())
    }

    async fn delete_failed_tasks(&self) -> CoreResult<()> {
        let mut state = self.lock();
        Self::enter(&mut state, MockOperation::DeleteFailed)?;
        state.tasks.retain(|t| t.status != TaskStatus::Failed);
        Ok(())
    }

    async fn course_detail(&self, video_id: &str) -> CoreResult<CourseDetail> {
        let mut state = self.lock();
        Self::enter(&mut state, MockOperation::CourseDetail)?;
        state
            .courses
            .get(video_id)
            .cloned()
            .ok_or_else(|| CoreError::BackendError {
                status: 404,
                message: format!("Video not found: {}", video_id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::subtitles::SubtitleEntry;

    #[tokio::test]
    async fn test_analyze_assigns_scripted_id() {
        let backend = MockParserBackend::new().with_next_task_id("T1");

        let task_id = backend.analyze("https://youtu.be/abc").await.unwrap();
        assert_eq!(task_id, "T1");
        assert_eq!(backend.task("T1").unwrap().status, TaskStatus::Pending);

        // Without a scripted id a fresh ULID is used
        let other = backend.analyze("https://youtu.be/def").await.unwrap();
        assert_eq!(other.len(), 26);
        assert_eq!(backend.calls(MockOperation::Analyze), 2);
    }

    #[tokio::test]
    async fn test_analyze_reuses_completed_task_for_same_url() {
        let mut done = Task::new("T9", "https://youtu.be/abc");
        done.apply_status(&StatusSnapshot::completed("V9"));
        let backend = MockParserBackend::new().with_task(done);

        assert_eq!(backend.analyze("https://youtu.be/abc").await.unwrap(), "T9");
    }

    #[tokio::test]
    async fn test_status_script_last_entry_repeats() {
        let backend = MockParserBackend::new()
            .with_next_task_id("T1")
            .with_status_script(
                "T1",
                vec![
                    StatusSnapshot::new(TaskStatus::Processing, 40),
                    StatusSnapshot::completed("V1"),
                ],
            );
        backend.analyze("https://youtu.be/abc").await.unwrap();

        assert_eq!(backend.task_status("T1").await.unwrap().progress, 40);
        assert_eq!(
            backend.task_status("T1").await.unwrap(),
            StatusSnapshot::completed("V1")
        );
        assert_eq!(
            backend.task_status("T1").await.unwrap(),
            StatusSnapshot::completed("V1")
        );
        assert_eq!(backend.status_calls("T1"), 3);
    }

    #[tokio::test]
    async fn test_unknown_task_reports_failed() {
        let backend = MockParserBackend::new();
        let snapshot = backend.task_status("missing").await.unwrap();
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("Task not found"));
    }

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let backend = MockParserBackend::new();
        backend.fail_next(MockOperation::List, 1);

        assert!(matches!(
            backend.list_tasks().await,
            Err(CoreError::NetworkError(_))
        ));
        assert!(backend.list_tasks().await.is_ok());
        assert_eq!(backend.calls(MockOperation::List), 2);
    }

    #[tokio::test]
    async fn test_delete_failed_keeps_others() {
        let mut failed = Task::new("F1", "u1");
        failed.apply_status(&StatusSnapshot::failed("boom"));
        let backend = MockParserBackend::new()
            .with_task(failed)
            .with_task(Task::new("P1", "u2"));

        backend.delete_failed_tasks().await.unwrap();

        let ids: Vec<TaskId> = backend
            .list_tasks()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        assert_eq!(ids, vec!["P1".to_string()]);
    }

    #[tokio::test]
    async fn test_course_detail_lookup() {
        let detail = CourseDetail {
            title: Some("Lecture".to_string()),
            video_url: "/downloads/V1/video.mp4".to_string(),
            subtitles: vec![SubtitleEntry::new(0.0, 5.0, "Hi", "嗨")],
        };
        let backend = MockParserBackend::new().with_course("V1", detail.clone());

        assert_eq!(backend.course_detail("V1").await.unwrap(), detail);
        assert!(matches!(
            backend.course_detail("V2").await,
            Err(CoreError::BackendError { status: 404, .. })
        ));
    }
}
