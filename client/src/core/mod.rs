//! Velp Core
//!
//! Task lifecycle against the parser backend and the dual-language subtitle
//! viewer it feeds.

pub mod backend;
pub mod playback;
pub mod settings;
pub mod subtitles;
pub mod tasks;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
