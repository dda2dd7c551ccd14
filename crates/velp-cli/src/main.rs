//! Velp command line client
//!
//! Submits videos to the parser backend, follows their processing and plays
//! finished courses with a headless subtitle overlay.

mod commands;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use velp_client::core::subtitles::DisplayMode;

use commands::{Context, PlayOptions};

#[derive(Debug, Parser)]
#[command(name = "velp", version, about = "Velp dual-language video study client")]
struct Cli {
    /// Backend API root, e.g. http://localhost:8080/api (overrides settings)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Directory holding settings.json
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    /// Also write daily rolling log files into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a video link for processing
    Submit {
        url: String,
        /// Keep polling until the task completes or fails
        #[arg(long)]
        follow: bool,
    },
    /// List tasks, newest first
    Tasks {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete one task
    Delete { task_id: String },
    /// Delete every failed task
    ClearFailed,
    /// Follow task changes and accept commands on stdin until Ctrl-C
    Watch,
    /// Show the course of a completed task
    Open { task_id: String },
    /// Play a processed video's subtitles against a simulated clock
    Play {
        video_id: String,
        /// both, primary, secondary or none
        #[arg(long, value_parser = parse_display_mode)]
        mode: Option<DisplayMode>,
        /// Playback rate (0.25 - 4.0)
        #[arg(long)]
        rate: Option<f64>,
        /// Loop the entry with this index
        #[arg(long)]
        loop_entry: Option<usize>,
        /// Stop after this many seconds of wall time
        #[arg(long)]
        duration: Option<f64>,
        /// Render the overlay as in fullscreen mode
        #[arg(long)]
        fullscreen: bool,
        /// Overlay font size in px
        #[arg(long)]
        font_size: Option<u32>,
    },
    /// Inspect or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print effective settings
    Show,
    /// Restore defaults
    Reset,
    /// Persist a new backend API root
    SetApiBase {
        url: String,
        /// Treat URL as the web client's origin and derive the API root from it
        #[arg(long)]
        from_origin: bool,
    },
}

fn parse_display_mode(value: &str) -> Result<DisplayMode, String> {
    value.parse::<DisplayMode>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    velp_client::init_logging(cli.log_dir.as_deref(), cli.verbose);

    let ctx = Context::new(cli.settings_dir, cli.api_base.as_deref())?;

    match cli.command {
        Command::Submit { url, follow } => commands::submit(&ctx, &url, follow).await,
        Command::Tasks { json } => commands::tasks(&ctx, json).await,
        Command::Delete { task_id } => commands::delete(&ctx, &task_id).await,
        Command::ClearFailed => commands::clear_failed(&ctx).await,
        Command::Watch => commands::watch(&ctx).await,
        Command::Open { task_id } => commands::open(&ctx, &task_id).await,
        Command::Play {
            video_id,
            mode,
            rate,
            loop_entry,
            duration,
            fullscreen,
            font_size,
        } => {
            let options = PlayOptions {
                mode,
                rate,
                loop_entry,
                duration,
                fullscreen,
                font_size,
            };
            commands::play(&ctx, &video_id, options).await
        }
        Command::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&ctx),
            ConfigAction::Reset => commands::config_reset(&ctx),
            ConfigAction::SetApiBase { url, from_origin } => {
                commands::config_set_api_base(&ctx, &url, from_origin)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit_with_globals() {
        let cli = Cli::try_parse_from([
            "velp",
            "submit",
            "https://youtu.be/abc",
            "--follow",
            "--api-base",
            "http://localhost:8080/api",
        ])
        .unwrap();

        assert_eq!(cli.api_base.as_deref(), Some("http://localhost:8080/api"));
        match cli.command {
            Command::Submit { url, follow } => {
                assert_eq!(url, "https://youtu.be/abc");
                assert!(follow);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_play_options() {
        let cli = Cli::try_parse_from([
            "velp",
            "play",
            "V1",
            "--mode",
            "secondary",
            "--rate",
            "1.5",
            "--loop-entry",
            "2",
        ])
        .unwrap();

        match cli.command {
            Command::Play {
                video_id,
                mode,
                rate,
                loop_entry,
                duration,
                fullscreen,
                ..
            } => {
                assert_eq!(video_id, "V1");
                assert_eq!(mode, Some(DisplayMode::SecondaryOnly));
                assert_eq!(rate, Some(1.5));
                assert_eq!(loop_entry, Some(2));
                assert_eq!(duration, None);
                assert!(!fullscreen);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["velp", "play", "V1", "--mode", "subtitles"]).is_err());
    }

    #[test]
    fn test_parse_config_and_task_commands() {
        let cli = Cli::try_parse_from([
            "velp",
            "config",
            "set-api-base",
            "https://velp.example.com/api",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::SetApiBase {
                    from_origin: false,
                    ..
                }
            }
        ));

        let cli = Cli::try_parse_from([
            "velp",
            "config",
            "set-api-base",
            "https://www.velp.example.com",
            "--from-origin",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::SetApiBase {
                    from_origin: true,
                    ..
                }
            }
        ));

        let cli = Cli::try_parse_from(["velp", "clear-failed", "-v"]).unwrap();
        assert!(matches!(cli.command, Command::ClearFailed));
        assert!(cli.verbose);

        let cli = Cli::try_parse_from(["velp", "open", "T1"]).unwrap();
        assert!(matches!(cli.command, Command::Open { ref task_id } if task_id == "T1"));

        assert!(Cli::try_parse_from(["velp", "delete"]).is_err());
    }
}
