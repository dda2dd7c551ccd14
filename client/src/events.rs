//! Event Emission Module
//!
//! Broadcasts controller and playback state changes to whatever view is
//! attached. Events are emitted after state has been updated so a
//! subscriber always observes the new state.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::{
    subtitles::{DisplayMode, OverlayText},
    tasks::{Task, TaskStatus},
    EntryIndex, TaskId, TimeSec, VideoId,
};

/// Default channel capacity for event buses
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// =============================================================================
// Event Names
// =============================================================================

/// Event names used for view communication
pub mod event_names {
    /// Task set replaced after a list fetch
    pub const TASKS_CHANGED: &str = "tasks:changed";
    /// Submission accepted by the backend
    pub const TASK_SUBMITTED: &str = "task:submitted";
    /// Poll reported a non-terminal status
    pub const TASK_PROGRESS: &str = "task:progress";
    /// Task completed and its video can be loaded
    pub const TASK_READY: &str = "task:ready";
    /// Task failed
    pub const TASK_FAILED: &str = "task:failed";
    /// Submit control enabled/disabled
    pub const SUBMISSION_ENABLED: &str = "submission:enabled";
    /// Current selection was deleted
    pub const SELECTION_CLEARED: &str = "selection:cleared";
    /// One-shot user-visible message
    pub const NOTICE: &str = "notice";

    /// Active subtitle entry changed
    pub const SUBTITLE_ACTIVE_CHANGED: &str = "subtitle:active-changed";
    /// Overlay text changed
    pub const OVERLAY_TEXT_CHANGED: &str = "overlay:text-changed";
    /// Overlay (fullscreen) visibility changed
    pub const OVERLAY_VISIBILITY_CHANGED: &str = "overlay:visibility-changed";
    pub const LOOP_CHANGED: &str = "playback:loop-changed";
    pub const LOOP_SEEK: &str = "playback:loop-seek";
    pub const DISPLAY_MODE_CHANGED: &str = "playback:display-mode-changed";
    pub const PLAYBACK_RATE_CHANGED: &str = "playback:rate-changed";
    pub const FONT_SIZE_CHANGED: &str = "playback:font-size-changed";
    /// New subtitle sequence loaded
    pub const SESSION_LOADED: &str = "session:loaded";
}

// =============================================================================
// Event Bus
// =============================================================================

/// Fan-out channel for one event type.
///
/// Emission never fails: with no subscribers the event is dropped, and a
/// subscriber that falls behind sees `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: E) {
        let _ = self.sender.send(event);
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

// =============================================================================
// Event Payloads
// =============================================================================

/// Events produced by the task lifecycle controller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControllerEvent {
    #[serde(rename_all = "camelCase")]
    TasksChanged { tasks: Vec<Task> },
    #[serde(rename_all = "camelCase")]
    TaskSubmitted { task_id: TaskId },
    #[serde(rename_all = "camelCase")]
    TaskProgress {
        task_id: TaskId,
        status: TaskStatus,
        progress: u8,
    },
    #[serde(rename_all = "camelCase")]
    TaskReady { task_id: TaskId, video_id: VideoId },
    #[serde(rename_all = "camelCase")]
    TaskFailed { task_id: TaskId, error: String },
    SubmissionEnabled { enabled: bool },
    SelectionCleared,
    Notice { message: String },
}

impl ControllerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerEvent::TasksChanged { .. } => event_names::TASKS_CHANGED,
            ControllerEvent::TaskSubmitted { .. } => event_names::TASK_SUBMITTED,
            ControllerEvent::TaskProgress { .. } => event_names::TASK_PROGRESS,
            ControllerEvent::TaskReady { .. } => event_names::TASK_READY,
            ControllerEvent::TaskFailed { .. } => event_names::TASK_FAILED,
            ControllerEvent::SubmissionEnabled { .. } => event_names::SUBMISSION_ENABLED,
            ControllerEvent::SelectionCleared => event_names::SELECTION_CLEARED,
            ControllerEvent::Notice { .. } => event_names::NOTICE,
        }
    }
}

/// Events produced by the synchronization engine and playback session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// `None` means no entry is on screen
    ActiveChanged {
        previous: Option<EntryIndex>,
        current: Option<EntryIndex>,
    },
    OverlayText { text: OverlayText },
    OverlayVisibility { visible: bool },
    LoopChanged { enabled: bool },
    /// Clock was sent back to the start of the looping entry
    LoopSeek { to: TimeSec },
    DisplayModeChanged { mode: DisplayMode },
    PlaybackRateChanged { rate: f64 },
    FontSizeChanged { size: u32 },
    SessionLoaded { entries: usize },
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::ActiveChanged { .. } => event_names::SUBTITLE_ACTIVE_CHANGED,
            SyncEvent::OverlayText { .. } => event_names::OVERLAY_TEXT_CHANGED,
            SyncEvent::OverlayVisibility { .. } => event_names::OVERLAY_VISIBILITY_CHANGED,
            SyncEvent::LoopChanged { .. } => event_names::LOOP_CHANGED,
            SyncEvent::LoopSeek { .. } => event_names::LOOP_SEEK,
            SyncEvent::DisplayModeChanged { .. } => event_names::DISPLAY_MODE_CHANGED,
            SyncEvent::PlaybackRateChanged { .. } => event_names::PLAYBACK_RATE_CHANGED,
            SyncEvent::FontSizeChanged { .. } => event_names::FONT_SIZE_CHANGED,
            SyncEvent::SessionLoaded { .. } => event_names::SESSION_LOADED,
        }
    }
}
