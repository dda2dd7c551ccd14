//! Velp Core Type Definitions
//!
//! Defines fundamental types shared by the task and playback sides.

// =============================================================================
// ID Types
// =============================================================================

/// Task unique identifier (assigned by the backend)
pub type TaskId = String;

/// Processed video identifier (assigned by the backend on completion)
pub type VideoId = String;

// =============================================================================
// Time Types
// =============================================================================

/// Media time in seconds (floating point, native time base)
pub type TimeSec = f64;

/// Wall-clock timestamp in milliseconds since the Unix epoch
pub type EpochMillis = i64;

/// Index into a loaded subtitle sequence
pub type EntryIndex = usize;
