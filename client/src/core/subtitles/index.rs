//! Subtitle Index
//!
//! Immutable, ordered entry sequence for one media item with time lookup.

use std::sync::Arc;

use crate::core::{EntryIndex, TimeSec};

use super::SubtitleEntry;

/// Problem found in backend-supplied subtitle data.
///
/// Diagnostics never reject a sequence; lookup falls back to the first
/// matching entry in sequence order.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexDiagnostic {
    /// Interval is empty, inverted or non-finite
    Malformed {
        index: EntryIndex,
        start: TimeSec,
        end: TimeSec,
    },
    /// Entry starts before its predecessor
    OutOfOrder { index: EntryIndex },
    /// Two consecutive entries share time
    Overlap { first: EntryIndex, second: EntryIndex },
}

impl std::fmt::Display for IndexDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexDiagnostic::Malformed { index, start, end } => {
                write!(f, "entry {} has invalid interval {:.3}~{:.3}s", index, start, end)
            }
            IndexDiagnostic::OutOfOrder { index } => {
                write!(f, "entry {} starts before its predecessor", index)
            }
            IndexDiagnostic::Overlap { first, second } => {
                write!(f, "entries {} and {} overlap", first, second)
            }
        }
    }
}

/// Ordered immutable subtitle sequence
#[derive(Clone, Debug, Default)]
pub struct SubtitleIndex {
    entries: Arc<[SubtitleEntry]>,
    /// Sorted, non-overlapping and well formed; enables binary search
    ordered: bool,
}

impl SubtitleIndex {
    pub fn new(entries: Vec<SubtitleEntry>) -> Self {
        let entries: Arc<[SubtitleEntry]> = entries.into();
        let ordered = Self::scan(&entries).is_empty();
        Self { entries, ordered }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: EntryIndex) -> Option<&SubtitleEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[SubtitleEntry] {
        &self.entries
    }

    /// End of the last entry, if any
    pub fn end_time(&self) -> Option<TimeSec> {
        self.entries
            .iter()
            .map(|e| e.end_time)
            .filter(|t| t.is_finite())
            .fold(None, |acc: Option<TimeSec>, t| Some(acc.map_or(t, |a| a.max(t))))
    }

    /// Returns the first entry (in sequence order) containing `time`.
    pub fn locate(&self, time: TimeSec) -> Option<EntryIndex> {
        if !time.is_finite() {
            return None;
        }

        if self.ordered {
            // Entries are disjoint and sorted: the only candidate is the last
            // entry starting at or before `time`.
            let candidate = self.entries.partition_point(|e| e.start_time <= time);
            return candidate
                .checked_sub(1)
                .filter(|&i| self.entries[i].contains(time));
        }

        self.entries.iter().position(|e| e.contains(time))
    }

    /// Data-quality problems in this sequence
    pub fn diagnostics(&self) -> Vec<IndexDiagnostic> {
        Self::scan(&self.entries)
    }

    fn scan(entries: &[SubtitleEntry]) -> Vec<IndexDiagnostic> {
        let mut issues = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            if !entry.is_well_formed() {
                issues.push(IndexDiagnostic::Malformed {
                    index,
                    start: entry.start_time,
                    end: entry.end_time,
                });
            }

            if index == 0 {
                continue;
            }
            let previous = &entries[index - 1];
            if entry.start_time < previous.start_time {
                issues.push(IndexDiagnostic::OutOfOrder { index });
            } else if entry.overlaps(previous) {
                issues.push(IndexDiagnostic::Overlap {
                    first: index - 1,
                    second: index,
                });
            }
        }

        issues
    }
}

impl From<Vec<SubtitleEntry>> for SubtitleIndex {
    fn from(entries: Vec<SubtitleEntry>) -> Self {
        Self::new(entries)
    }
}
