//! Subtitles Module
//!
//! Dual-language subtitle data and the synchronization engine that maps
//! playback time onto it.
//!
//! # Architecture
//!
//! ```text
//! CourseDetail ──► SubtitleIndex ──► SyncEngine ◄── time advances
//!                                        │
//!                                        ▼
//!                              SyncEvent (active entry,
//!                              overlay text, loop seek)
//! ```

mod index;
mod models;
mod sync;

pub use index::*;
pub use models::*;
pub use sync::*;
