//! Velp Client Library
//!
//! Submits video links to the Velp parser backend, follows the resulting
//! processing tasks and drives a synchronized dual-language subtitle viewer
//! for finished videos.
//!
//! ## Layout
//!
//! - [`core::tasks`]: task lifecycle controller and pollers
//! - [`core::subtitles`]: subtitle index and synchronization engine
//! - [`core::playback`]: clock adapter and playback session
//! - [`core::backend`]: backend contract, HTTP client and mock
//! - [`events`]: broadcast event surface consumed by views

pub mod core;
pub mod events;

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;

/// Log file name prefix inside the log directory
pub const LOG_FILE_NAME: &str = "velp.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initializes global logging.
///
/// Logs go to stderr and, when `log_dir` is given, to a daily rolling file.
/// `RUST_LOG` directives apply on top of the default level. Calling this
/// again after a subscriber is installed has no effect.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) {
    use tracing_subscriber::prelude::*;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(false);

    let file_layer = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Only the first guard is kept; later writers are never installed.
        if LOG_GUARD.set(guard).is_err() {
            return None;
        }
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    // Avoid panics if already initialized (tests, repeated CLI setup).
    let _ = tracing::subscriber::set_global_default(subscriber);
}
