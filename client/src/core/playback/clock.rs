//! Playback Clock Adapter
//!
//! Abstracts the media player's time source. The session reads time from it
//! and issues seeks; the clock never calls back into the engine.

use std::time::Duration;

use crate::core::TimeSec;

/// Continuous media time source
pub trait PlaybackClock: Send {
    /// Current position in the media's native time base
    fn current_time(&self) -> TimeSec;

    fn seek(&mut self, time: TimeSec);

    fn play(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// Forwards a playback rate to the player
    fn set_rate(&mut self, rate: f64);

    /// Points the player at a new media source
    fn load_source(&mut self, url: &str);
}

/// Deterministic clock advanced by the caller.
///
/// Used by the headless viewer and by tests in place of a real player.
#[derive(Clone, Debug)]
pub struct SimulatedClock {
    position: TimeSec,
    rate: f64,
    playing: bool,
    source: Option<String>,
    duration: Option<TimeSec>,
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self {
            position: 0.0,
            rate: 1.0,
            playing: false,
            source: None,
            duration: None,
        }
    }

    /// Caps the position; reaching the end pauses playback
    pub fn with_duration(mut self, duration: TimeSec) -> Self {
        self.duration = Some(duration.max(0.0));
        self
    }

    pub fn with_position(mut self, position: TimeSec) -> Self {
        self.position = position;
        self
    }

    /// Moves time forward by `elapsed` wall time scaled by the rate
    pub fn advance(&mut self, elapsed: Duration) {
        if !self.playing {
            return;
        }
        self.position += elapsed.as_secs_f64() * self.rate;
        if let Some(duration) = self.duration {
            if self.position >= duration {
                self.position = duration;
                self.playing = false;
            }
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn duration(&self) -> Option<TimeSec> {
        self.duration
    }

    /// True once a bounded clock has played to its end
    pub fn is_finished(&self) -> bool {
        self.duration.is_some_and(|d| self.position >= d)
    }
}

impl PlaybackClock for SimulatedClock {
    fn current_time(&self) -> TimeSec {
        self.position
    }

    fn seek(&mut self, time: TimeSec) {
        let time = time.max(0.0);
        self.position = match self.duration {
            Some(duration) => time.min(duration),
            None => time,
        };
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn load_source(&mut self, url: &str) {
        self.source = Some(url.to_string());
        self.position = 0.0;
        self.playing = false;
    }
}
