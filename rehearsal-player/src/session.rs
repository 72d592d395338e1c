//! Session manifests
//!
//! A session is a JSON list of songs whose audio the host has already
//! decoded. Each track names its decoded buffer length; the engine never
//! sees audio payloads.
//!
//! ```json
//! {
//!   "songs": [{
//!     "title": "Opener",
//!     "tracks": [{ "name": "vocals", "duration": 182.4 }],
//!     "arrangement": [{ "start": 0.0, "end": 182.4, "enabled": true }],
//!     "loop": { "start": 30.0, "end": 45.0, "enabled": false }
//!   }]
//! }
//! ```

use crate::error::{Error, Result};
use crate::model::{
    validate_arrangement, validate_mute_sections, validate_pitch, validate_speed,
    ArrangementSection, DecodedAudio, MuteSection, Song, Track,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_volume() -> f32 {
    1.0
}

fn default_speed() -> f64 {
    1.0
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_channels() -> u16 {
    2
}

/// One track of a song manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackManifest {
    pub name: String,
    /// Decoded buffer length (seconds)
    pub duration: f64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub pan: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub pitch_exempt: bool,
    #[serde(default)]
    pub mute_sections: Vec<MuteSection>,
}

/// Loop region of a song manifest
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoopManifest {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub enabled: bool,
}

/// One song of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongManifest {
    pub title: String,
    pub tracks: Vec<TrackManifest>,
    /// Empty means one enabled section spanning the song
    #[serde(default)]
    pub arrangement: Vec<ArrangementSection>,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub pitch_semitones: i32,
    #[serde(default, rename = "loop")]
    pub loop_region: Option<LoopManifest>,
}

impl SongManifest {
    /// Build a validated song
    pub fn into_song(self) -> Result<Song> {
        if self.tracks.is_empty() {
            return Err(Error::Session(format!("song '{}' has no tracks", self.title)));
        }
        let mut tracks = Vec::with_capacity(self.tracks.len());
        for t in self.tracks {
            if !t.duration.is_finite() || t.duration <= 0.0 {
                return Err(Error::Session(format!(
                    "track '{}' has invalid duration {}",
                    t.name, t.duration
                )));
            }
            validate_mute_sections(&t.mute_sections)?;
            let mut audio = DecodedAudio::new(t.duration);
            audio.sample_rate = t.sample_rate;
            audio.channels = t.channels;

            let mut track = Track::new(t.name, audio);
            track.volume = t.volume.clamp(0.0, 1.0);
            track.pan = t.pan.clamp(-1.0, 1.0);
            track.muted = t.muted;
            track.solo = t.solo;
            track.pitch_exempt = t.pitch_exempt;
            track.mute_sections = t.mute_sections;
            tracks.push(track);
        }

        let mut song = Song::new(self.title, tracks);
        if !self.arrangement.is_empty() {
            validate_arrangement(&self.arrangement)?;
            song.arrangement = self.arrangement;
        }
        song.transport.speed = validate_speed(self.speed)?;
        song.transport.pitch_semitones = validate_pitch(self.pitch_semitones)?;
        if let Some(region) = self.loop_region {
            if region.end <= region.start {
                return Err(Error::Session(format!(
                    "song '{}' loop [{}, {}) is empty",
                    song.title, region.start, region.end
                )));
            }
            song.transport.loop_start = Some(region.start);
            song.transport.loop_end = Some(region.end);
            song.transport.loop_enabled = region.enabled;
        }
        Ok(song)
    }
}

/// A session: songs in mashup order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionManifest {
    pub songs: Vec<SongManifest>,
}

impl SessionManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a session file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Session(format!("cannot read {}: {}", path.display(), e)))?;
        let session = Self::from_json(&json)?;
        info!("Loaded session {} ({} songs)", path.display(), session.songs.len());
        Ok(session)
    }

    /// Build every song, failing on the first invalid one
    pub fn into_songs(self) -> Result<Vec<Song>> {
        self.songs.into_iter().map(SongManifest::into_song).collect()
    }
}
