//! Song data model
//!
//! Transport, arrangement and mute data are created when a song is loaded
//! and persist with the song. Runtime graph nodes live elsewhere
//! (`playback::routing`) and only exist while a song is attached.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use rehearsal_common::events::{ArrangementSection, MuteSection};

/// Slowest supported playback speed
pub const MIN_SPEED: f64 = 0.5;
/// Fastest supported playback speed
pub const MAX_SPEED: f64 = 2.0;
/// Lowest supported pitch shift (semitones)
pub const MIN_PITCH_SEMITONES: i32 = -6;
/// Highest supported pitch shift (semitones)
pub const MAX_PITCH_SEMITONES: i32 = 6;

/// Handle to audio already decoded and held by the graph host
///
/// Decoding and caching belong to the host; the engine only needs to know
/// which buffer to bind a source to and how long it is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodedAudio {
    /// Host-side buffer key
    pub buffer_id: Uuid,
    /// Length of the decoded content (seconds)
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn new(duration: f64) -> Self {
        Self {
            buffer_id: Uuid::new_v4(),
            duration,
            sample_rate: 44_100,
            channels: 2,
        }
    }
}

/// Per-song transport state
///
/// `position` is virtual song time, mutated only by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    pub position: f64,
    /// Position captured by the most recent `play()`; `stop()` returns here
    pub last_play_position: f64,
    pub speed: f64,
    pub pitch_semitones: i32,
    pub loop_enabled: bool,
    pub loop_start: Option<f64>,
    pub loop_end: Option<f64>,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            position: 0.0,
            last_play_position: 0.0,
            speed: 1.0,
            pitch_semitones: 0,
            loop_enabled: false,
            loop_start: None,
            loop_end: None,
        }
    }
}

impl Transport {
    /// Loop bounds when looping is enabled and both ends are set
    pub fn loop_bounds(&self) -> Option<(f64, f64)> {
        if !self.loop_enabled {
            return None;
        }
        match (self.loop_start, self.loop_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

/// One stem of a song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub audio: DecodedAudio,
    /// Linear gain applied when audible (0.0-1.0)
    pub volume: f32,
    /// Stereo pan (-1.0 left .. 1.0 right)
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    /// Routed through the bypass unit: tempo follows speed, pitch shift never applies
    pub pitch_exempt: bool,
    /// Ordered, contiguous time-range mutes (source time)
    pub mute_sections: Vec<MuteSection>,
}

impl Track {
    pub fn new(name: impl Into<String>, audio: DecodedAudio) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            audio,
            volume: 1.0,
            pan: 0.0,
            muted: false,
            solo: false,
            pitch_exempt: false,
            mute_sections: Vec::new(),
        }
    }
}

/// A song: its stems, transport and arrangement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: Uuid,
    pub title: String,
    pub tracks: Vec<Track>,
    pub transport: Transport,
    /// Ordered, contiguous sections covering `[0, duration)`
    pub arrangement: Vec<ArrangementSection>,
}

impl Song {
    /// Create a song whose arrangement is a single enabled section
    ///
    /// Without any audio the arrangement stays empty.
    pub fn new(title: impl Into<String>, tracks: Vec<Track>) -> Self {
        let mut song = Self {
            id: Uuid::new_v4(),
            title: title.into(),
            tracks,
            transport: Transport::default(),
            arrangement: Vec::new(),
        };
        if song.duration() > 0.0 {
            song.arrangement = vec![ArrangementSection::new(0.0, song.duration(), true)];
        }
        song
    }

    /// Longest track duration (seconds)
    pub fn duration(&self) -> f64 {
        self.tracks
            .iter()
            .map(|t| t.audio.duration)
            .fold(0.0, f64::max)
    }

    pub fn track(&self, track_id: Uuid) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    pub fn track_mut(&mut self, track_id: Uuid) -> Result<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == track_id)
            .ok_or_else(|| Error::NotFound(format!("track {}", track_id)))
    }

    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }
}

/// Check a speed against the supported range
pub fn validate_speed(speed: f64) -> Result<f64> {
    if speed.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(speed)
    } else {
        Err(Error::InvalidParameter(format!(
            "speed {} outside [{}, {}]",
            speed, MIN_SPEED, MAX_SPEED
        )))
    }
}

/// Check a pitch shift against the supported range
pub fn validate_pitch(semitones: i32) -> Result<i32> {
    if (MIN_PITCH_SEMITONES..=MAX_PITCH_SEMITONES).contains(&semitones) {
        Ok(semitones)
    } else {
        Err(Error::InvalidParameter(format!(
            "pitch {} outside [{}, {}]",
            semitones, MIN_PITCH_SEMITONES, MAX_PITCH_SEMITONES
        )))
    }
}

/// Tolerance when checking that sections meet end-to-start
const CONTIGUITY_TOLERANCE: f64 = 1e-6;

/// Check that `(start, end)` ranges are ordered, non-empty and contiguous from 0
///
/// Malformed data is rejected, never repaired.
pub fn validate_ranges(ranges: &[(f64, f64)], what: &str) -> Result<()> {
    let mut expected_start = 0.0;
    for (i, &(start, end)) in ranges.iter().enumerate() {
        if !start.is_finite() || !end.is_finite() || end <= start {
            return Err(Error::InvalidParameter(format!(
                "{} {} has invalid bounds [{}, {})",
                what, i, start, end
            )));
        }
        if (start - expected_start).abs() > CONTIGUITY_TOLERANCE {
            return Err(Error::InvalidParameter(format!(
                "{} {} starts at {} but previous ends at {}",
                what, i, start, expected_start
            )));
        }
        expected_start = end;
    }
    Ok(())
}

/// Validate an arrangement (must have at least one section)
pub fn validate_arrangement(sections: &[ArrangementSection]) -> Result<()> {
    if sections.is_empty() {
        return Err(Error::InvalidParameter("arrangement has no sections".to_string()));
    }
    let ranges: Vec<(f64, f64)> = sections.iter().map(|s| (s.start, s.end)).collect();
    validate_ranges(&ranges, "arrangement section")
}

/// Validate a track's mute sections (may be empty)
pub fn validate_mute_sections(sections: &[MuteSection]) -> Result<()> {
    let ranges: Vec<(f64, f64)> = sections.iter().map(|s| (s.start, s.end)).collect();
    validate_ranges(&ranges, "mute section")
}
