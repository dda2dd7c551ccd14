//! Command handlers
//!
//! Each subcommand builds what it needs from [`Context`] and drives the
//! library directly. One-shot commands step the task controller until their
//! result settles; `watch` and `play` run until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use velp_client::core::backend::{ApiBase, HttpParserBackend, ParserBackend};
use velp_client::core::playback::{PlaybackClock, PlaybackSession, SimulatedClock};
use velp_client::core::settings::{ClientSettings, SettingsManager};
use velp_client::core::subtitles::{DisplayMode, SubtitleIndex};
use velp_client::core::tasks::{ControllerCommand, ControllerConfig, TaskController};
use velp_client::events::{ControllerEvent, SyncEvent};

use crate::render;

/// Media kept past the last subtitle so the final entry can finish
const TAIL_MARGIN_SEC: f64 = 1.0;

const COMMAND_BUFFER: usize = 32;

/// Settings and factories shared by all commands
pub struct Context {
    manager: SettingsManager,
    settings: ClientSettings,
}

impl Context {
    /// Loads settings from `settings_dir` (or the platform default) and
    /// applies the environment and command line overrides.
    pub fn new(settings_dir: Option<PathBuf>, api_base: Option<&str>) -> Result<Self> {
        let dir = settings_dir.unwrap_or_else(SettingsManager::default_dir);
        let manager = SettingsManager::new(dir);
        let mut settings = manager.load_effective();

        if let Some(value) = api_base {
            let base = ApiBase::parse(value)
                .with_context(|| format!("Invalid --api-base '{}'", value))?;
            settings.api.base_url = base.to_string();
        }

        debug!("Using backend {}", settings.api.base_url);
        Ok(Self { manager, settings })
    }

    fn api_base(&self) -> Result<ApiBase> {
        Ok(self.settings.api_base()?)
    }

    fn backend(&self) -> Result<Arc<dyn ParserBackend>> {
        let backend = HttpParserBackend::from_settings(&self.settings.api)
            .context("Failed to create HTTP client")?;
        Ok(Arc::new(backend))
    }

    fn controller(&self) -> Result<TaskController> {
        Ok(TaskController::new(
            self.backend()?,
            ControllerConfig::from(&self.settings.polling),
        ))
    }
}

/// Overrides for the headless player
#[derive(Debug, Default)]
pub struct PlayOptions {
    pub mode: Option<DisplayMode>,
    pub rate: Option<f64>,
    pub loop_entry: Option<usize>,
    pub duration: Option<f64>,
    pub fullscreen: bool,
    pub font_size: Option<u32>,
}

// =============================================================================
// Task Commands
// =============================================================================

fn drain<E: Clone>(rx: &mut broadcast::Receiver<E>) -> Vec<E> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!("Dropped {} events", skipped);
            }
            Err(_) => break,
        }
    }
    events
}

pub async fn submit(ctx: &Context, url: &str, follow: bool) -> Result<()> {
    let mut controller = ctx.controller()?;
    let mut events = controller.subscribe();
    controller.submit(url)?;

    let mut task_id: Option<String> = None;
    while controller.step().await {
        for event in drain(&mut events) {
            if let Some(line) = render::controller_event_line(&event) {
                if follow || !matches!(event, ControllerEvent::TasksChanged { .. }) {
                    println!("{}", line);
                }
            }

            match event {
                ControllerEvent::Notice { message } => bail!(message),
                ControllerEvent::TaskSubmitted { task_id: id } => {
                    if !follow {
                        return Ok(());
                    }
                    task_id = Some(id);
                }
                ControllerEvent::TaskReady { task_id: id, .. } if task_id.as_ref() == Some(&id) => {
                    return Ok(());
                }
                ControllerEvent::TaskFailed { task_id: id, error }
                    if task_id.as_ref() == Some(&id) =>
                {
                    bail!("Task {} failed: {}", id, error);
                }
                _ => {}
            }
        }
    }

    bail!("Task controller stopped before the task settled")
}

pub async fn tasks(ctx: &Context, json: bool) -> Result<()> {
    let mut controller = ctx.controller()?;
    let tasks = controller
        .refresh_now()
        .await
        .context("Failed to fetch tasks")?;

    if json {
        println!("{}", serde_json::to_string_pretty(tasks)?);
    } else {
        println!("{}", render::task_table(tasks));
    }
    Ok(())
}

pub async fn delete(ctx: &Context, task_id: &str) -> Result<()> {
    let mut controller = ctx.controller()?;
    let mut events = controller.subscribe();
    controller.delete_task(task_id)?;
    settle_once(&mut controller, &mut events).await?;
    println!("Deleted task {}", task_id.trim());
    Ok(())
}

pub async fn clear_failed(ctx: &Context) -> Result<()> {
    let mut controller = ctx.controller()?;
    let mut events = controller.subscribe();
    controller.clear_failed();
    settle_once(&mut controller, &mut events).await?;
    println!("Failed tasks removed");
    Ok(())
}

/// Applies the next backend result and surfaces its notice as an error
async fn settle_once(
    controller: &mut TaskController,
    events: &mut broadcast::Receiver<ControllerEvent>,
) -> Result<()> {
    if !controller.step().await {
        bail!("Task controller stopped unexpectedly");
    }
    for event in drain(events) {
        if let ControllerEvent::Notice { message } = event {
            bail!(message);
        }
    }
    Ok(())
}

pub async fn open(ctx: &Context, task_id: &str) -> Result<()> {
    let mut controller = ctx.controller()?;
    let mut events = controller.subscribe();
    controller
        .refresh_now()
        .await
        .context("Failed to fetch tasks")?;
    controller.select_task(task_id)?;

    let video_id = 'settled: loop {
        for event in drain(&mut events) {
            match event {
                ControllerEvent::TaskReady { video_id, .. } => break 'settled video_id,
                ControllerEvent::Notice { message } => bail!(message),
                _ => {}
            }
        }
        if !controller.step().await {
            bail!("Task controller stopped before the task was opened");
        }
    };

    let base = ctx.api_base()?;
    let detail = controller
        .backend()
        .course_detail(&video_id)
        .await
        .with_context(|| format!("Failed to load video {}", video_id))?;

    println!("{}", detail.title.as_deref().unwrap_or("Untitled"));
    println!("Video:    {}", base.resolve(&detail.video_url)?);
    println!("Download: {}", base.download_url(&video_id));
    println!("Play:     velp play {}", video_id);
    println!();
    if detail.subtitles.is_empty() {
        println!("No subtitles.");
    } else {
        println!("{}", render::subtitle_listing(&detail.subtitles));
    }
    Ok(())
}

// =============================================================================
// Watch
// =============================================================================

/// A line typed into `watch`
#[derive(Debug, PartialEq)]
enum WatchInput {
    Command(ControllerCommand),
    Quit,
}

fn parse_command(line: &str) -> Result<Option<WatchInput>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (line, ""),
    };

    let require = |what: &str| {
        if arg.is_empty() {
            Err(format!("usage: {} <{}>", verb, what))
        } else {
            Ok(arg.to_string())
        }
    };

    let input = match verb.to_ascii_lowercase().as_str() {
        "submit" | "s" => WatchInput::Command(ControllerCommand::Submit {
            url: require("url")?,
        }),
        "delete" | "rm" => WatchInput::Command(ControllerCommand::Delete {
            task_id: require("task-id")?,
        }),
        "open" | "o" => WatchInput::Command(ControllerCommand::Select {
            task_id: require("task-id")?,
        }),
        "clear-failed" | "clear" => WatchInput::Command(ControllerCommand::ClearFailed),
        "refresh" | "r" => WatchInput::Command(ControllerCommand::Refresh),
        "quit" | "exit" | "q" => WatchInput::Quit,
        other => return Err(format!("Unknown command '{}'", other)),
    };
    Ok(Some(input))
}

pub async fn watch(ctx: &Context) -> Result<()> {
    let mut controller = ctx.controller()?;
    let mut events = controller.subscribe();
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

    let controller_task = tokio::spawn(async move {
        controller.run(command_rx).await;
    });

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(event = event.name(), "controller event");
                    if let Some(line) = render::controller_event_line(&event) {
                        println!("{}", line);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("Watching {}", ctx.settings.api.base_url);
    println!("{}", render::WATCH_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(Some(WatchInput::Quit)) => break,
                    Ok(Some(WatchInput::Command(command))) => {
                        if command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => eprintln!("{}", message),
                },
                Ok(None) => {
                    debug!("stdin closed; waiting for Ctrl-C");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    drop(command_tx);
    controller_task.await.context("Task controller panicked")?;
    printer.abort();
    info!("Stopped watching");
    Ok(())
}

// =============================================================================
// Play
// =============================================================================

pub async fn play(ctx: &Context, video_id: &str, options: PlayOptions) -> Result<()> {
    let base = ctx.api_base()?;
    let backend = ctx.backend()?;
    let detail = backend
        .course_detail(video_id)
        .await
        .with_context(|| format!("Failed to load video {}", video_id))?;

    let mut viewer = ctx.settings.viewer.clone();
    if let Some(mode) = options.mode {
        viewer.display_mode = mode;
    }

    let media_end = SubtitleIndex::new(detail.subtitles.clone())
        .end_time()
        .map(|end| end + TAIL_MARGIN_SEC)
        .unwrap_or(0.0);
    let clock = SimulatedClock::new().with_duration(media_end);

    let mut session = PlaybackSession::new(clock, &viewer);
    let mut events = session.subscribe();
    session.load_course(detail, Some(&base))?;

    if let Some(rate) = options.rate {
        session.set_playback_rate(rate)?;
    }
    if let Some(size) = options.font_size {
        session.set_font_size(size);
    }
    if options.fullscreen {
        session.toggle_fullscreen();
    }
    match options.loop_entry {
        Some(index) => {
            session.select_entry(index)?;
            session.set_loop(true);
        }
        None => session.play(),
    }

    println!(
        "Playing '{}' ({}) at {:.2}x, {}",
        session.title().unwrap_or("Untitled"),
        session.video_url().unwrap_or("-"),
        session.playback_rate(),
        session.engine().display_mode()
    );

    let wall_limit = options
        .duration
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64);
    let started = Instant::now();
    let mut last = started;
    let mut ticker = tokio::time::interval(viewer.tick_interval());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let now = Instant::now();
                session.clock_mut().advance(now - last);
                last = now;
                session.tick();

                let font_size = session
                    .engine()
                    .overlay_visible()
                    .then(|| session.font_size());
                let at = render::format_time(session.clock().current_time());
                for event in drain(&mut events) {
                    debug!(event = event.name(), "playback event");
                    if let Some(line) = render::sync_event_line(&event, font_size) {
                        println!("[{}] {}", at, line);
                    }
                    if let SyncEvent::LoopSeek { .. } = event {
                        debug!("Looped entry {:?}", session.active_index());
                    }
                }

                if session.clock().is_finished() {
                    println!("[{}] end of video", at);
                    break;
                }
                if wall_limit.is_some_and(|limit| started.elapsed() >= limit) {
                    break;
                }
            }
        }
    }

    session.pause();
    Ok(())
}

// =============================================================================
// Config
// =============================================================================

pub fn config_show(ctx: &Context) -> Result<()> {
    println!("# {}", ctx.manager.settings_path().display());
    println!("{}", serde_json::to_string_pretty(&ctx.settings)?);
    Ok(())
}

pub fn config_reset(ctx: &Context) -> Result<()> {
    ctx.manager.reset()?;
    println!("Settings reset to defaults");
    Ok(())
}

/// Persists a new API root. With `from_origin`, `url` is the address the web
/// client is served from and the API root is derived from it.
pub fn config_set_api_base(ctx: &Context, url: &str, from_origin: bool) -> Result<()> {
    let base = if from_origin {
        ApiBase::from_origin(url).with_context(|| format!("Invalid origin '{}'", url))?
    } else {
        ApiBase::parse(url).with_context(|| format!("Invalid API base '{}'", url))?
    };

    // Start from the file, not the effective settings, so overrides stay transient.
    let mut settings = ctx.manager.load();
    settings.api.base_url = base.to_string();
    let saved = ctx.manager.save(&settings)?;

    println!("API base set to {}", saved.api.base_url);
    Ok(())
}
