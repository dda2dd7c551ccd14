//! Subtitle Synchronization Engine
//!
//! Turns continuous time advances into discrete active-entry transitions,
//! overlay text updates and loop seeks. The engine never touches the clock
//! itself; a loop seek is returned to the caller to perform.

use tracing::{debug, info, warn};

use crate::core::{EntryIndex, TimeSec};
use crate::events::{EventBus, SyncEvent};

use super::{DisplayMode, OverlayText, SubtitleEntry, SubtitleIndex};

/// Tolerance before an entry's end at which loop mode seeks back.
/// Covers time sources that only report a few updates per second.
pub const LOOP_TOLERANCE_SEC: TimeSec = 0.1;

/// Result of a single time advance
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SyncOutcome {
    /// Active entry did not change
    Unchanged,
    /// Active entry changed
    Changed {
        previous: Option<EntryIndex>,
        current: Option<EntryIndex>,
    },
    /// Loop mode requests the clock be moved to `to`
    LoopSeek { to: TimeSec },
}

impl SyncOutcome {
    pub fn is_transition(&self) -> bool {
        matches!(self, SyncOutcome::Changed { .. })
    }
}

/// Maps playback time onto a subtitle index
#[derive(Debug)]
pub struct SyncEngine {
    index: SubtitleIndex,
    active: Option<EntryIndex>,
    display_mode: DisplayMode,
    loop_enabled: bool,
    loop_tolerance: TimeSec,
    overlay: OverlayText,
    overlay_visible: bool,
    events: EventBus<SyncEvent>,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            index: SubtitleIndex::empty(),
            active: None,
            display_mode: DisplayMode::default(),
            loop_enabled: false,
            loop_tolerance: LOOP_TOLERANCE_SEC,
            overlay: OverlayText::default(),
            overlay_visible: false,
            events: EventBus::default(),
        }
    }

    /// Overrides the loop tolerance (negative or non-finite values fall back
    /// to the default)
    pub fn with_loop_tolerance(mut self, tolerance: TimeSec) -> Self {
        self.loop_tolerance = if tolerance.is_finite() && tolerance >= 0.0 {
            tolerance
        } else {
            LOOP_TOLERANCE_SEC
        };
        self
    }

    pub fn with_display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = mode;
        self
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Replaces the subtitle sequence. The active entry and overlay are
    /// cleared in the same step, so nothing from the previous video survives.
    pub fn load(&mut self, index: SubtitleIndex) {
        for diagnostic in index.diagnostics() {
            warn!("Subtitle data issue: {}", diagnostic);
        }

        let previous = self.active.take();
        self.index = index;
        let overlay_was_set = !self.overlay.is_empty();
        self.overlay = OverlayText::default();

        info!("Loaded {} subtitle entries", self.index.len());

        if previous.is_some() {
            self.events.emit(SyncEvent::ActiveChanged {
                previous,
                current: None,
            });
        }
        if overlay_was_set {
            self.emit_overlay();
        }
        self.events.emit(SyncEvent::SessionLoaded {
            entries: self.index.len(),
        });
    }

    /// Convenience for loading a plain entry list
    pub fn load_entries(&mut self, entries: Vec<SubtitleEntry>) {
        self.load(SubtitleIndex::new(entries));
    }

    // =========================================================================
    // Time Advance
    // =========================================================================

    /// Reacts to the clock reaching `time`.
    ///
    /// With loop mode on and an entry active, reaching the last
    /// `loop_tolerance` seconds of that entry yields a [`SyncOutcome::LoopSeek`]
    /// and skips the lookup for this tick. Otherwise the entry containing
    /// `time` becomes active; repeated calls with an unchanged result emit
    /// nothing.
    pub fn on_time_advance(&mut self, time: TimeSec) -> SyncOutcome {
        if !time.is_finite() {
            debug!("Ignoring non-finite time {}", time);
            return SyncOutcome::Unchanged;
        }

        if self.loop_enabled {
            if let Some(entry) = self.active_entry() {
                if time >= entry.end_time - self.loop_tolerance {
                    let to = entry.start_time;
                    debug!("Loop seek {:.3} -> {:.3}", time, to);
                    self.events.emit(SyncEvent::LoopSeek { to });
                    return SyncOutcome::LoopSeek { to };
                }
            }
        }

        let current = self.index.locate(time);
        if current == self.active {
            return SyncOutcome::Unchanged;
        }

        let previous = self.active;
        self.active = current;
        self.overlay = self.project_active();

        debug!("Active entry {:?} -> {:?} at {:.3}", previous, current, time);
        self.events
            .emit(SyncEvent::ActiveChanged { previous, current });
        self.emit_overlay();

        SyncOutcome::Changed { previous, current }
    }

    // =========================================================================
    // Modes
    // =========================================================================

    /// Changes which languages are shown and re-projects at once
    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        if mode == self.display_mode {
            return;
        }
        self.display_mode = mode;
        self.events.emit(SyncEvent::DisplayModeChanged { mode });

        let projected = self.project_active();
        if projected != self.overlay {
            self.overlay = projected;
            self.emit_overlay();
        }
    }

    pub fn set_loop(&mut self, enabled: bool) {
        if enabled == self.loop_enabled {
            return;
        }
        self.loop_enabled = enabled;
        info!("Loop mode {}", if enabled { "enabled" } else { "disabled" });
        self.events.emit(SyncEvent::LoopChanged { enabled });
    }

    /// Flips loop mode and returns the new state
    pub fn toggle_loop(&mut self) -> bool {
        self.set_loop(!self.loop_enabled);
        self.loop_enabled
    }

    /// Shows or hides the fullscreen overlay. Overlay text is tracked either
    /// way, so showing it reveals the current entry immediately.
    pub fn set_overlay_visible(&mut self, visible: bool) {
        if visible == self.overlay_visible {
            return;
        }
        self.overlay_visible = visible;
        self.events.emit(SyncEvent::OverlayVisibility { visible });
        if visible {
            self.emit_overlay();
        }
    }

    /// Flips fullscreen overlay visibility and returns the new state
    pub fn toggle_fullscreen(&mut self) -> bool {
        self.set_overlay_visible(!self.overlay_visible);
        self.overlay_visible
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn index(&self) -> &SubtitleIndex {
        &self.index
    }

    pub fn active_index(&self) -> Option<EntryIndex> {
        self.active
    }

    pub fn active_entry(&self) -> Option<&SubtitleEntry> {
        self.active.and_then(|i| self.index.get(i))
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn loop_tolerance(&self) -> TimeSec {
        self.loop_tolerance
    }

    pub fn overlay(&self) -> &OverlayText {
        &self.overlay
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Shared bus, so the owning session can publish its own changes
    pub(crate) fn bus(&self) -> &EventBus<SyncEvent> {
        &self.events
    }

    fn project_active(&self) -> OverlayText {
        self.active_entry()
            .map(|entry| self.display_mode.project(entry))
            .unwrap_or_default()
    }

    fn emit_overlay(&self) {
        self.events.emit(SyncEvent::OverlayText {
            text: self.overlay.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::Receiver;

    fn hi_bye() -> Vec<SubtitleEntry> {
        vec![
            SubtitleEntry::new(0.0, 5.0, "Hi", "嗨"),
            SubtitleEntry::new(5.0, 9.0, "Bye", "拜"),
        ]
    }

    fn loaded() -> SyncEngine {
        let mut engine = SyncEngine::new();
        engine.load_entries(hi_bye());
        engine
    }

    fn drain(rx: &mut Receiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn active_changes(events: &[SyncEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SyncEvent::ActiveChanged { .. }))
            .count()
    }

    #[test]
    fn test_active_sequence_through_timeline() {
        let mut engine = loaded();

        let mut seen = Vec::new();
        for t in [0.0, 4.0, 6.0, 10.0] {
            engine.on_time_advance(t);
            seen.push(engine.active_index());
        }

        assert_eq!(seen, vec![Some(0), Some(0), Some(1), None]);
        assert!(engine.overlay().is_empty());
    }

    #[test]
    fn test_active_index_matches_containing_entry() {
        let entries = vec![
            SubtitleEntry::new(0.5, 2.0, "a", ""),
            SubtitleEntry::new(2.0, 2.5, "b", ""),
            SubtitleEntry::new(4.0, 7.0, "c", ""),
        ];
        let mut engine = SyncEngine::new();
        engine.load_entries(entries.clone());

        // Jumps forwards and backwards, like scrubbing
        let times = [0.0, 3.0, 0.6, 6.99, 2.49, 2.0, 7.0, 1.0, 4.0, 10.0, 0.5];
        for t in times {
            engine.on_time_advance(t);
            let expected = entries.iter().position(|e| e.contains(t));
            assert_eq!(engine.active_index(), expected, "time {}", t);
        }
    }

    #[test]
    fn test_repeated_time_is_idempotent() {
        let mut engine = loaded();
        let mut rx = engine.subscribe();

        assert!(engine.on_time_advance(1.0).is_transition());
        assert_eq!(engine.on_time_advance(1.0), SyncOutcome::Unchanged);
        assert_eq!(engine.on_time_advance(1.2), SyncOutcome::Unchanged);

        assert_eq!(active_changes(&drain(&mut rx)), 1);
    }

    #[test]
    fn test_overlay_projection_on_activation() {
        let mut engine = loaded();
        let mut rx = engine.subscribe();

        engine.on_time_advance(6.0);

        assert_eq!(engine.overlay().primary, "Bye");
        assert_eq!(engine.overlay().secondary, "拜");
        let events = drain(&mut rx);
        assert!(events.contains(&SyncEvent::ActiveChanged {
            previous: None,
            current: Some(1)
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            SyncEvent::OverlayText { text } if text.primary == "Bye"
        )));
    }

    #[test]
    fn test_loop_seeks_back_near_entry_end() {
        let mut engine = loaded();
        engine.on_time_advance(5.5);
        engine.set_loop(true);

        assert_eq!(engine.on_time_advance(8.0), SyncOutcome::Unchanged);
        assert_eq!(engine.on_time_advance(8.95), SyncOutcome::LoopSeek { to: 5.0 });
        assert_eq!(engine.active_index(), Some(1));

        // Past the end entirely still loops while the entry is active
        assert_eq!(engine.on_time_advance(9.3), SyncOutcome::LoopSeek { to: 5.0 });
        assert_eq!(engine.active_index(), Some(1));
    }

    #[test]
    fn test_loop_without_active_entry_tracks_normally() {
        let mut engine = SyncEngine::new();
        engine.load_entries(vec![SubtitleEntry::new(2.0, 4.0, "a", "")]);
        engine.set_loop(true);

        assert_eq!(engine.on_time_advance(1.0), SyncOutcome::Unchanged);
        assert!(engine.on_time_advance(2.5).is_transition());
        assert_eq!(engine.on_time_advance(3.95), SyncOutcome::LoopSeek { to: 2.0 });
    }

    #[test]
    fn test_disabling_loop_resumes_tracking() {
        let mut engine = loaded();
        engine.on_time_advance(6.0);
        engine.set_loop(true);
        assert!(matches!(engine.on_time_advance(8.95), SyncOutcome::LoopSeek { .. }));

        assert!(!engine.toggle_loop());
        assert_eq!(
            engine.on_time_advance(9.5),
            SyncOutcome::Changed {
                previous: Some(1),
                current: None
            }
        );
    }

    #[test]
    fn test_display_mode_change_reprojects_immediately() {
        let mut engine = loaded();
        engine.on_time_advance(1.0);
        let mut rx = engine.subscribe();

        engine.set_display_mode(DisplayMode::SecondaryOnly);

        assert_eq!(engine.overlay().primary, "");
        assert_eq!(engine.overlay().secondary, "嗨");
        let events = drain(&mut rx);
        assert_eq!(active_changes(&events), 0);
        assert!(events.contains(&SyncEvent::OverlayText {
            text: OverlayText {
                primary: String::new(),
                secondary: "嗨".to_string()
            }
        }));

        engine.set_display_mode(DisplayMode::None);
        assert!(engine.overlay().is_empty());
    }

    #[test]
    fn test_reload_resets_active_and_overlay() {
        let mut engine = loaded();
        engine.on_time_advance(6.0);
        engine.set_loop(true);
        let mut rx = engine.subscribe();

        engine.load_entries(vec![SubtitleEntry::new(100.0, 101.0, "x", "y")]);

        assert_eq!(engine.active_index(), None);
        assert!(engine.overlay().is_empty());
        let events = drain(&mut rx);
        assert!(events.contains(&SyncEvent::ActiveChanged {
            previous: Some(1),
            current: None
        }));
        assert!(events.contains(&SyncEvent::SessionLoaded { entries: 1 }));

        // Loop has no active entry to pin to after the reload
        assert_eq!(engine.on_time_advance(6.0), SyncOutcome::Unchanged);
    }

    #[test]
    fn test_fullscreen_shows_current_text() {
        let mut engine = loaded();
        engine.on_time_advance(1.0);
        let mut rx = engine.subscribe();

        assert!(engine.toggle_fullscreen());
        let events = drain(&mut rx);
        assert_eq!(events[0], SyncEvent::OverlayVisibility { visible: true });
        assert!(matches!(
            &events[1],
            SyncEvent::OverlayText { text } if text.primary == "Hi"
        ));

        assert!(!engine.toggle_fullscreen());
    }

    #[test]
    fn test_malformed_and_overlapping_data_does_not_panic() {
        let mut engine = SyncEngine::new();
        engine.load_entries(vec![
            SubtitleEntry::new(3.0, 1.0, "inverted", ""),
            SubtitleEntry::new(0.0, 6.0, "a", ""),
            SubtitleEntry::new(4.0, 8.0, "b", ""),
            SubtitleEntry::new(f64::NAN, 9.0, "nan", ""),
        ]);

        engine.on_time_advance(2.0);
        assert_eq!(engine.active_index(), Some(1));
        engine.on_time_advance(5.0);
        assert_eq!(engine.active_index(), Some(1));
        engine.on_time_advance(7.0);
        assert_eq!(engine.active_index(), Some(2));
        assert_eq!(engine.on_time_advance(f64::NAN), SyncOutcome::Unchanged);
    }

    #[test]
    fn test_empty_session() {
        let mut engine = SyncEngine::new();
        assert_eq!(engine.on_time_advance(3.0), SyncOutcome::Unchanged);
        engine.set_loop(true);
        assert_eq!(engine.on_time_advance(3.0), SyncOutcome::Unchanged);
    }
}
