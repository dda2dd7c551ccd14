//! Playback Session
//!
//! Binds a clock to the synchronization engine for one loaded course and
//! carries the viewer settings that are forwarded to the player or the view.

use tracing::{debug, info};

use crate::core::backend::ApiBase;
use crate::core::settings::{clamp_font_size, clamp_rate, ViewerSettings};
use crate::core::subtitles::{
    CourseDetail, DisplayMode, OverlayText, SubtitleIndex, SyncEngine, SyncOutcome,
};
use crate::core::{CoreError, CoreResult, EntryIndex, TimeSec};
use crate::events::SyncEvent;

use super::PlaybackClock;

/// One viewer session driven by a playback clock
#[derive(Debug)]
pub struct PlaybackSession<C: PlaybackClock> {
    clock: C,
    engine: SyncEngine,
    playback_rate: f64,
    font_size: u32,
    title: Option<String>,
    video_url: Option<String>,
}

impl<C: PlaybackClock> PlaybackSession<C> {
    pub fn new(clock: C, settings: &ViewerSettings) -> Self {
        let engine = SyncEngine::new()
            .with_loop_tolerance(settings.loop_tolerance_secs())
            .with_display_mode(settings.display_mode);
        let mut session = Self {
            clock,
            engine,
            playback_rate: clamp_rate(settings.playback_rate),
            font_size: clamp_font_size(settings.font_size),
            title: None,
            video_url: None,
        };
        session.clock.set_rate(session.playback_rate);
        session
    }

    /// Loads a processed course: points the clock at its media, re-applies
    /// the playback rate and swaps the subtitle sequence.
    pub fn load_course(&mut self, detail: CourseDetail, base: Option<&ApiBase>) -> CoreResult<()> {
        let video_url = match base {
            Some(base) => base.resolve(&detail.video_url)?,
            None => detail.video_url.clone(),
        };

        self.clock.load_source(&video_url);
        self.clock.set_rate(self.playback_rate);
        self.clock.seek(0.0);

        info!(
            "Loaded course '{}' ({} subtitles) from {}",
            detail.title.as_deref().unwrap_or("untitled"),
            detail.subtitles.len(),
            video_url
        );

        self.title = detail.title;
        self.video_url = Some(video_url);
        self.engine.load(SubtitleIndex::new(detail.subtitles));
        Ok(())
    }

    /// Samples the clock and runs the engine. A loop seek is carried out on
    /// the clock before returning.
    pub fn tick(&mut self) -> SyncOutcome {
        let now = self.clock.current_time();
        let outcome = self.engine.on_time_advance(now);
        if let SyncOutcome::LoopSeek { to } = outcome {
            self.clock.seek(to);
        }
        outcome
    }

    /// Jumps to an entry and resumes playback. The engine picks the new
    /// position up on the next tick like any other time change.
    pub fn select_entry(&mut self, index: EntryIndex) -> CoreResult<TimeSec> {
        let start = self
            .engine
            .index()
            .get(index)
            .map(|entry| entry.start_time)
            .ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "Subtitle entry {} out of range (0..{})",
                    index,
                    self.engine.index().len()
                ))
            })?;

        debug!("Seeking to entry {} at {:.3}s", index, start);
        self.clock.seek(start);
        self.clock.play();
        Ok(start)
    }

    pub fn play(&mut self) {
        self.clock.play();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    /// Sets the playback rate. Non-positive or non-finite values are
    /// rejected; others are clamped to the supported range.
    pub fn set_playback_rate(&mut self, rate: f64) -> CoreResult<f64> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Playback rate must be a positive number, got {}",
                rate
            )));
        }

        let rate = clamp_rate(rate);
        self.playback_rate = rate;
        self.clock.set_rate(rate);
        self.engine.bus().emit(SyncEvent::PlaybackRateChanged { rate });
        Ok(rate)
    }

    pub fn set_font_size(&mut self, size: u32) -> u32 {
        let size = clamp_font_size(size);
        if size != self.font_size {
            self.font_size = size;
            self.engine.bus().emit(SyncEvent::FontSizeChanged { size });
        }
        size
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.engine.set_display_mode(mode);
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.engine.set_loop(enabled);
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.engine.toggle_loop()
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        self.engine.toggle_fullscreen()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.engine.subscribe()
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn overlay(&self) -> &OverlayText {
        self.engine.overlay()
    }

    pub fn active_index(&self) -> Option<EntryIndex> {
        self.engine.active_index()
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref()
    }
}
