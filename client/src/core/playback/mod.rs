//! Playback Module
//!
//! Clock adapter and the session that drives the synchronization engine.

mod clock;
mod session;

pub use clock::*;
pub use session::*;
