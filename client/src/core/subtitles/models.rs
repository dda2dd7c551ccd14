//! Subtitle Data Models
//!
//! Timed dual-language entries, display modes and the overlay projection.

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::{CoreError, TimeSec};

// =============================================================================
// Subtitle Entry
// =============================================================================

/// One timed caption interval with two language variants.
///
/// The interval is half-open: `[start_time, end_time)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleEntry {
    /// Start time in seconds
    pub start_time: TimeSec,
    /// End time in seconds (exclusive)
    pub end_time: TimeSec,
    /// Source-language text
    #[serde(default, alias = "en", deserialize_with = "null_as_empty")]
    pub primary_text: String,
    /// Translated text
    #[serde(default, alias = "cn", deserialize_with = "null_as_empty")]
    pub secondary_text: String,
}

impl SubtitleEntry {
    pub fn new(
        start_time: TimeSec,
        end_time: TimeSec,
        primary_text: impl Into<String>,
        secondary_text: impl Into<String>,
    ) -> Self {
        Self {
            start_time,
            end_time,
            primary_text: primary_text.into(),
            secondary_text: secondary_text.into(),
        }
    }

    /// Returns true if the entry is on screen at the given time
    pub fn contains(&self, time: TimeSec) -> bool {
        time >= self.start_time && time < self.end_time
    }

    /// Returns the duration of this entry in seconds
    pub fn duration(&self) -> TimeSec {
        self.end_time - self.start_time
    }

    /// A usable interval has finite bounds and a positive length
    pub fn is_well_formed(&self) -> bool {
        self.start_time.is_finite() && self.end_time.is_finite() && self.start_time < self.end_time
    }

    /// Returns true if this entry overlaps with another
    pub fn overlaps(&self, other: &SubtitleEntry) -> bool {
        self.start_time < other.end_time && self.end_time > other.start_time
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_empty_list<'de, D>(deserializer: D) -> Result<Vec<SubtitleEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<SubtitleEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Course Detail
// =============================================================================

/// Playable content for a processed video
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Media location; may be relative to the backend origin
    pub video_url: String,
    #[serde(default, deserialize_with = "null_as_empty_list")]
    pub subtitles: Vec<SubtitleEntry>,
}

// =============================================================================
// Display Mode
// =============================================================================

/// Which caption languages are rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayMode {
    /// Both languages
    #[default]
    Both,
    /// Source language only
    PrimaryOnly,
    /// Translation only
    SecondaryOnly,
    /// Captions hidden
    None,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 4] = [
        DisplayMode::Both,
        DisplayMode::PrimaryOnly,
        DisplayMode::SecondaryOnly,
        DisplayMode::None,
    ];

    pub fn shows_primary(&self) -> bool {
        match self {
            DisplayMode::Both | DisplayMode::PrimaryOnly => true,
            DisplayMode::SecondaryOnly | DisplayMode::None => false,
        }
    }

    pub fn shows_secondary(&self) -> bool {
        match self {
            DisplayMode::Both | DisplayMode::SecondaryOnly => true,
            DisplayMode::PrimaryOnly | DisplayMode::None => false,
        }
    }

    /// Projects an entry into the text the overlay should show
    pub fn project(&self, entry: &SubtitleEntry) -> OverlayText {
        OverlayText {
            primary: if self.shows_primary() {
                entry.primary_text.clone()
            } else {
                String::new()
            },
            secondary: if self.shows_secondary() {
                entry.secondary_text.clone()
            } else {
                String::new()
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Both => "both",
            DisplayMode::PrimaryOnly => "primary",
            DisplayMode::SecondaryOnly => "secondary",
            DisplayMode::None => "none",
        }
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DisplayMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" | "dual" => Ok(DisplayMode::Both),
            "primary" | "primaryonly" | "en" => Ok(DisplayMode::PrimaryOnly),
            "secondary" | "secondaryonly" | "cn" => Ok(DisplayMode::SecondaryOnly),
            "none" | "off" => Ok(DisplayMode::None),
            other => Err(CoreError::ValidationError(format!(
                "Unknown display mode '{}' (expected both, primary, secondary or none)",
                other
            ))),
        }
    }
}

// =============================================================================
// Overlay Text
// =============================================================================

/// Text currently projected onto the overlay
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayText {
    pub primary: String,
    pub secondary: String,
}

impl OverlayText {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }
}
