//! Terminal rendering
//!
//! Pure formatting of tasks, events and subtitles for the CLI.

use velp_client::core::subtitles::{OverlayText, SubtitleEntry};
use velp_client::core::tasks::{Task, TaskStatus};
use velp_client::core::TimeSec;
use velp_client::events::{ControllerEvent, SyncEvent};

const PROGRESS_WIDTH: usize = 20;
const TITLE_WIDTH: usize = 48;

/// Help shown when `watch` starts
pub const WATCH_HELP: &str = "\
Commands: submit <url> | delete <task-id> | clear-failed | open <task-id> | refresh | quit
Press Ctrl-C to stop.";

/// `[########------------]  40%`
pub fn progress_bar(progress: u8) -> String {
    let progress = progress.min(100) as usize;
    let filled = progress * PROGRESS_WIDTH / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(PROGRESS_WIDTH - filled),
        progress
    )
}

/// Media time as `mm:ss.t`
pub fn format_time(seconds: TimeSec) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--.-".to_string();
    }
    let tenths = (seconds * 10.0).round() as u64;
    format!("{:02}:{:02}.{}", tenths / 600, (tenths / 10) % 60, tenths % 10)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn status_cell(task: &Task) -> String {
    match task.status {
        TaskStatus::Pending | TaskStatus::Processing => {
            format!("{:<10} {}", task.status.label(), progress_bar(task.progress))
        }
        TaskStatus::Completed => format!(
            "{:<10} {}",
            "completed",
            task.video_id.as_deref().unwrap_or("-")
        ),
        TaskStatus::Failed => format!(
            "{:<10} {}",
            "failed",
            truncate(task.error.as_deref().unwrap_or("unknown error"), 30)
        ),
    }
}

/// Task list as an aligned table
pub fn task_table(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks.".to_string();
    }

    let id_width = tasks
        .iter()
        .map(|t| t.task_id.chars().count())
        .max()
        .unwrap_or(0)
        .max(2);

    let mut out = format!("{:<id_width$}  {:<16}  {:<37}  TITLE\n", "ID", "CREATED", "STATUS");
    for task in tasks {
        let created = task
            .created_at_utc()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<id_width$}  {:<16}  {:<37}  {}\n",
            task.task_id,
            created,
            status_cell(task),
            truncate(task.display_title(), TITLE_WIDTH)
        ));
    }
    out.pop();
    out
}

/// One line per controller event; `None` for events not worth printing
pub fn controller_event_line(event: &ControllerEvent) -> Option<String> {
    match event {
        ControllerEvent::TasksChanged { tasks } => {
            let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
            Some(format!(
                "{} tasks ({} active, {} completed, {} failed)",
                tasks.len(),
                count(TaskStatus::Pending) + count(TaskStatus::Processing),
                count(TaskStatus::Completed),
                count(TaskStatus::Failed)
            ))
        }
        ControllerEvent::TaskSubmitted { task_id } => Some(format!("Submitted task {}", task_id)),
        ControllerEvent::TaskProgress {
            task_id,
            status,
            progress,
        } => Some(format!("{} {:<10} {}", task_id, status.label(), progress_bar(*progress))),
        ControllerEvent::TaskReady { task_id, video_id } => {
            Some(format!("{} ready: video {} (velp play {})", task_id, video_id, video_id))
        }
        ControllerEvent::TaskFailed { task_id, error } => {
            Some(format!("{} failed: {}", task_id, error))
        }
        ControllerEvent::SelectionCleared => Some("Selection cleared".to_string()),
        ControllerEvent::Notice { message } => Some(format!("! {}", message)),
        ControllerEvent::SubmissionEnabled { .. } => None,
    }
}

/// Overlay text as printed by the headless player
pub fn overlay_lines(text: &OverlayText, font_size: Option<u32>) -> String {
    if text.is_empty() {
        return "(no subtitle)".to_string();
    }
    let mut lines = Vec::new();
    if !text.primary.is_empty() {
        lines.push(text.primary.clone());
    }
    if !text.secondary.is_empty() {
        lines.push(text.secondary.clone());
    }
    let joined = lines.join(" / ");
    match font_size {
        Some(size) => format!("[{}px] {}", size, joined),
        None => joined,
    }
}

/// One line per playback event; `None` for events folded into others
pub fn sync_event_line(event: &SyncEvent, font_size: Option<u32>) -> Option<String> {
    match event {
        SyncEvent::ActiveChanged { current, .. } => Some(match current {
            Some(index) => format!("entry #{}", index),
            None => "entry -".to_string(),
        }),
        SyncEvent::OverlayText { text } => Some(format!("  {}", overlay_lines(text, font_size))),
        SyncEvent::OverlayVisibility { visible } => Some(format!(
            "fullscreen {}",
            if *visible { "on" } else { "off" }
        )),
        SyncEvent::LoopChanged { enabled } => {
            Some(format!("loop {}", if *enabled { "on" } else { "off" }))
        }
        SyncEvent::LoopSeek { to } => Some(format!("loop -> {}", format_time(*to))),
        SyncEvent::DisplayModeChanged { mode } => Some(format!("display mode {}", mode)),
        SyncEvent::PlaybackRateChanged { rate } => Some(format!("rate {:.2}x", rate)),
        SyncEvent::FontSizeChanged { size } => Some(format!("font size {}px", size)),
        SyncEvent::SessionLoaded { entries } => {
            Some(format!("{} subtitle entries loaded", entries))
        }
    }
}

/// Numbered subtitle listing
pub fn subtitle_listing(entries: &[SubtitleEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            format!(
                "{:>4}  {} - {}  {}\n      {}",
                i,
                format_time(e.start_time),
                format_time(e.end_time),
                e.primary_text,
                e.secondary_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
