//! Section types shared between the engine and its clients
//!
//! Arrangement and mute sections travel both ways: clients edit them and the
//! engine echoes them back in change events.

use serde::{Deserialize, Serialize};

/// Contiguous time range of the song timeline, flagged enabled/disabled
///
/// An ordered list of these partitions `[0, duration)`. Disabled sections
/// are skipped during playback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrangementSection {
    /// Section start (seconds, inclusive)
    pub start: f64,
    /// Section end (seconds, exclusive except for the last section)
    pub end: f64,
    /// Whether playback passes through this section
    pub enabled: bool,
}

impl ArrangementSection {
    pub fn new(start: f64, end: f64, enabled: bool) -> Self {
        Self { start, end, enabled }
    }
}

/// Contiguous per-track time range, flagged muted/unmuted
///
/// Indexed by source time: a mute applies to the raw audio content
/// regardless of arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuteSection {
    /// Section start (source seconds, inclusive)
    pub start: f64,
    /// Section end (source seconds, exclusive)
    pub end: f64,
    /// Whether the track is silenced inside this range
    pub muted: bool,
}

impl MuteSection {
    pub fn new(start: f64, end: f64, muted: bool) -> Self {
        Self { start, end, muted }
    }
}
