//! Task Lifecycle Controller
//!
//! Owns the local task set and drives submission, per-task polling, list
//! refreshes, deletion and selection against the parser backend.
//!
//! Every backend call runs in a spawned task and reports back through a
//! single inbox. Only the controller applies those results, so task state
//! has exactly one writer and needs no locks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::core::backend::ParserBackend;
use crate::core::settings::PollingSettings;
use crate::core::{CoreError, CoreResult, TaskId};
use crate::events::{ControllerEvent, EventBus};

use super::poller::PollRegistry;
use super::{sort_newest_first, StatusSnapshot, Task, TaskStatus};

/// Error text used when a failed task carries none
const UNKNOWN_ERROR: &str = "unknown error";

// =============================================================================
// Configuration
// =============================================================================

/// Controller timing configuration
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Delay between status polls of one task
    pub poll_interval: Duration,
    /// Delay between background task list refreshes
    pub refresh_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&PollingSettings::default())
    }
}

impl From<&PollingSettings> for ControllerConfig {
    fn from(settings: &PollingSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            refresh_interval: settings.refresh_interval(),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Settled backend call, delivered to the controller inbox
#[derive(Debug)]
pub(crate) enum Completion {
    Submitted {
        url: String,
        result: CoreResult<TaskId>,
    },
    Polled {
        task_id: TaskId,
        result: CoreResult<StatusSnapshot>,
    },
    Listed {
        result: CoreResult<Vec<Task>>,
    },
    Deleted {
        task_id: TaskId,
        result: CoreResult<()>,
    },
    FailedCleared {
        result: CoreResult<()>,
    },
    Selected {
        task_id: TaskId,
        result: CoreResult<StatusSnapshot>,
    },
}

/// User action delivered to a running controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerCommand {
    Submit { url: String },
    Refresh,
    Delete { task_id: TaskId },
    ClearFailed,
    Select { task_id: TaskId },
}

// =============================================================================
// Task Controller
// =============================================================================

/// Client-side task lifecycle state machine
pub struct TaskController {
    backend: Arc<dyn ParserBackend>,
    config: ControllerConfig,
    /// Last fetched task set, newest first
    tasks: Vec<Task>,
    /// Task whose video the viewer should show
    current_task_id: Option<TaskId>,
    /// A submission round trip is in flight
    submitting: bool,
    /// Deletes sent but not yet settled
    pending_deletes: HashSet<TaskId>,
    pollers: PollRegistry,
    inbox_tx: mpsc::UnboundedSender<Completion>,
    inbox_rx: Option<mpsc::UnboundedReceiver<Completion>>,
    events: EventBus<ControllerEvent>,
}

impl std::fmt::Debug for TaskController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskController")
            .field("backend", &self.backend.name())
            .field("tasks", &self.tasks.len())
            .field("current_task_id", &self.current_task_id)
            .field("submitting", &self.submitting)
            .field("pollers", &self.pollers.len())
            .finish_non_exhaustive()
    }
}

impl TaskController {
    pub fn new(backend: Arc<dyn ParserBackend>, config: ControllerConfig) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        Self {
            backend,
            config,
            tasks: Vec::new(),
            current_task_id: None,
            submitting: false,
            pending_deletes: HashSet::new(),
            pollers: PollRegistry::new(),
            inbox_tx,
            inbox_rx: Some(inbox_rx),
            events: EventBus::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn backend(&self) -> &Arc<dyn ParserBackend> {
        &self.backend
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn current_task_id(&self) -> Option<&str> {
        self.current_task_id.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn is_polling(&self, task_id: &str) -> bool {
        self.pollers.is_polling(task_id)
    }

    pub fn active_pollers(&self) -> usize {
        self.pollers.len()
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Submits a source link. Submission stays disabled until the backend
    /// answers; polling of the new task starts as soon as it has an id.
    pub fn submit(&mut self, url: &str) -> CoreResult<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CoreError::ValidationError(
                "Please enter a video URL".to_string(),
            ));
        }
        if self.submitting {
            return Err(CoreError::SubmissionInProgress);
        }

        self.submitting = true;
        self.events
            .emit(ControllerEvent::SubmissionEnabled { enabled: false });
        info!("Submitting {}", url);

        let backend = Arc::clone(&self.backend);
        let url = url.to_string();
        self.spawn(async move {
            let result = backend.analyze(&url).await;
            Completion::Submitted { url, result }
        });
        Ok(())
    }

    /// Refetches the full task set
    pub fn refresh(&self) {
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            Completion::Listed {
                result: backend.list_tasks().await,
            }
        });
    }

    /// Fetches and applies the task set in place. Unlike [`refresh`], a
    /// failure is returned to the caller.
    ///
    /// [`refresh`]: TaskController::refresh
    pub async fn refresh_now(&mut self) -> CoreResult<&[Task]> {
        let tasks = self.backend.list_tasks().await?;
        self.on_listed(Ok(tasks));
        Ok(&self.tasks)
    }

    pub fn delete_task(&mut self, task_id: &str) -> CoreResult<()> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(CoreError::ValidationError("Task id is empty".to_string()));
        }

        self.pending_deletes.insert(task_id.to_string());
        let backend = Arc::clone(&self.backend);
        let task_id = task_id.to_string();
        self.spawn(async move {
            let result = backend.delete_task(&task_id).await;
            Completion::Deleted { task_id, result }
        });
        Ok(())
    }

    /// Removes every failed task on the backend
    pub fn clear_failed(&self) {
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            Completion::FailedCleared {
                result: backend.delete_failed_tasks().await,
            }
        });
    }

    /// Makes a completed task current and announces its video.
    ///
    /// When the local record has no video id yet, the status is fetched
    /// first and the announcement follows once it settles.
    pub fn select_task(&mut self, task_id: &str) -> CoreResult<()> {
        let task = self
            .task(task_id)
            .ok_or_else(|| CoreError::TaskNotFound(task_id.to_string()))?;
        if task.status != TaskStatus::Completed {
            return Err(CoreError::TaskNotReady(task_id.to_string()));
        }

        let task_id = task.task_id.clone();
        let known_video = task.video_id.clone();
        self.current_task_id = Some(task_id.clone());

        match known_video {
            Some(video_id) => {
                self.events
                    .emit(ControllerEvent::TaskReady { task_id, video_id });
            }
            None => {
                let backend = Arc::clone(&self.backend);
                self.spawn(async move {
                    let result = backend.task_status(&task_id).await;
                    Completion::Selected { task_id, result }
                });
            }
        }
        Ok(())
    }

    /// Executes a user command, turning failures into notices
    pub fn handle_command(&mut self, command: ControllerCommand) {
        debug!("Handling {:?}", command);
        let outcome = match command {
            ControllerCommand::Submit { url } => self.submit(&url).map_err(|e| (e, "Submit")),
            ControllerCommand::Refresh => {
                self.refresh();
                Ok(())
            }
            ControllerCommand::Delete { task_id } => {
                self.delete_task(&task_id).map_err(|e| (e, "Delete task"))
            }
            ControllerCommand::ClearFailed => {
                self.clear_failed();
                Ok(())
            }
            ControllerCommand::Select { task_id } => {
                self.select_task(&task_id).map_err(|e| (e, "Open task"))
            }
        };

        if let Err((error, action)) = outcome {
            self.notice(error.to_notice(action));
        }
    }

    // =========================================================================
    // Event Loop
    // =========================================================================

    /// Waits for one backend call to settle and applies it.
    /// Returns false if the inbox is unavailable.
    pub async fn step(&mut self) -> bool {
        let Some(inbox) = self.inbox_rx.as_mut() else {
            return false;
        };
        let next = inbox.recv().await;
        match next {
            Some(completion) => {
                self.apply(completion);
                true
            }
            None => false,
        }
    }

    /// Runs the controller until the command channel closes.
    ///
    /// The task set is fetched at once and then every refresh interval.
    /// All pollers are cancelled on exit.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<ControllerCommand>) {
        let Some(mut inbox) = self.inbox_rx.take() else {
            warn!("Task controller is already running");
            return;
        };

        let mut refresh = tokio::time::interval(self.config.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Task controller started (poll every {:?}, refresh every {:?})",
            self.config.poll_interval, self.config.refresh_interval
        );

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("Command channel closed, stopping task controller");
                        break;
                    }
                },
                Some(completion) = inbox.recv() => self.apply(completion),
                _ = refresh.tick() => self.refresh(),
            }
        }

        self.pollers.cancel_all();
        self.inbox_rx = Some(inbox);
    }

    /// Stops all polling
    pub fn shutdown(&mut self) {
        self.pollers.cancel_all();
    }

    // =========================================================================
    // Applying Results
    // =========================================================================

    fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Submitted { url, result } => self.on_submitted(&url, result),
            Completion::Polled { task_id, result } => self.on_polled(task_id, result),
            Completion::Listed { result } => self.on_listed(result),
            Completion::Deleted { task_id, result } => self.on_deleted(task_id, result),
            Completion::FailedCleared { result } => match result {
                Ok(()) => {
                    info!("Failed tasks cleared");
                    self.refresh();
                }
                Err(e) => self.notice(e.to_notice("Cleanup")),
            },
            Completion::Selected { task_id, result } => self.on_selected(task_id, result),
        }
    }

    fn on_submitted(&mut self, url: &str, result: CoreResult<TaskId>) {
        self.submitting = false;
        self.events
            .emit(ControllerEvent::SubmissionEnabled { enabled: true });

        match result {
            Ok(task_id) => {
                info!("Task {} created for {}", task_id, url);
                self.start_polling(&task_id);
                self.events
                    .emit(ControllerEvent::TaskSubmitted { task_id });
                self.refresh();
            }
            Err(e) => {
                warn!("Submission of {} failed: {}", url, e);
                self.notice(e.to_notice("Submit"));
            }
        }
    }

    fn on_polled(&mut self, task_id: TaskId, result: CoreResult<StatusSnapshot>) {
        if !self.pollers.is_polling(&task_id) || self.pending_deletes.contains(&task_id) {
            debug!("Ignoring stale status for task {}", task_id);
            return;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if e.is_transient() {
                    warn!("Polling task {} failed, retrying next tick: {}", task_id, e);
                } else {
                    error!("Polling task {} failed, retrying next tick: {}", task_id, e);
                }
                return;
            }
        };

        if let Some(task) = self.tasks.iter_mut().find(|t| t.task_id == task_id) {
            task.apply_status(&snapshot);
        }

        match snapshot.status {
            TaskStatus::Pending | TaskStatus::Processing => {
                debug!("Task {} {} {}%", task_id, snapshot.status, snapshot.progress);
                self.events.emit(ControllerEvent::TaskProgress {
                    task_id,
                    status: snapshot.status,
                    progress: snapshot.progress,
                });
            }
            TaskStatus::Completed => {
                self.pollers.finish(&task_id);
                match snapshot.video_id {
                    Some(video_id) => {
                        info!("Task {} completed: video {}", task_id, video_id);
                        self.current_task_id = Some(task_id.clone());
                        self.events
                            .emit(ControllerEvent::TaskReady { task_id, video_id });
                    }
                    None => {
                        warn!("Task {} completed without a video id", task_id);
                        self.notice(format!("Task {} completed without a video id", task_id));
                    }
                }
                self.refresh();
            }
            TaskStatus::Failed => {
                self.pollers.finish(&task_id);
                let error = snapshot
                    .error
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                warn!("Task {} failed: {}", task_id, error);
                self.events
                    .emit(ControllerEvent::TaskFailed { task_id, error });
                self.refresh();
            }
        }
    }

    fn on_listed(&mut self, result: CoreResult<Vec<Task>>) {
        match result {
            Ok(mut tasks) => {
                sort_newest_first(&mut tasks);
                debug!("Task list refreshed: {} tasks", tasks.len());
                self.tasks = tasks;
                self.events.emit(ControllerEvent::TasksChanged {
                    tasks: self.tasks.clone(),
                });
            }
            Err(e) if e.is_transient() => warn!("Task list refresh failed: {}", e),
            Err(e) => error!("Task list refresh failed: {}", e),
        }
    }

    fn on_deleted(&mut self, task_id: TaskId, result: CoreResult<()>) {
        self.pending_deletes.remove(&task_id);

        match result {
            Ok(()) => {
                self.pollers.cancel(&task_id);
                if self.current_task_id.as_deref() == Some(task_id.as_str()) {
                    self.current_task_id = None;
                    self.events.emit(ControllerEvent::SelectionCleared);
                }
                self.refresh();
            }
            Err(e) => {
                warn!("Deleting task {} failed: {}", task_id, e);
                // Statuses that settled while the delete was pending were
                // dropped, and the loop may already have ended on one.
                if self.pollers.cancel(&task_id) {
                    self.start_polling(&task_id);
                }
                self.notice(e.to_notice("Delete task"));
            }
        }
    }

    fn on_selected(&mut self, task_id: TaskId, result: CoreResult<StatusSnapshot>) {
        if self.current_task_id.as_deref() != Some(task_id.as_str()) {
            debug!("Ignoring stale selection of task {}", task_id);
            return;
        }

        match result {
            Ok(snapshot) => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.task_id == task_id) {
                    task.apply_status(&snapshot);
                }
                match snapshot.video_id {
                    Some(video_id) => self
                        .events
                        .emit(ControllerEvent::TaskReady { task_id, video_id }),
                    None => self.notice(format!("Task {} has no video yet", task_id)),
                }
            }
            Err(e) => self.notice(e.to_notice("Open task")),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn start_polling(&mut self, task_id: &str) {
        let started = self.pollers.start(
            task_id,
            Arc::clone(&self.backend),
            self.config.poll_interval,
            self.inbox_tx.clone(),
        );
        if !started {
            debug!("Task {} is already being polled", task_id);
        }
    }

    fn spawn<F>(&self, call: F)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let _ = inbox.send(call.await);
        });
    }

    fn notice(&self, message: String) {
        self.events.emit(ControllerEvent::Notice { message });
    }
}
