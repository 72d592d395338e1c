//! Playback graph ownership
//!
//! **Signal chain per track:** source → gain → pan → pitch unit → master.
//!
//! **Pitch units:** two per live song. The primary unit applies the user's
//! pitch shift; the bypass unit carries pitch-exempt tracks with identical
//! processing latency but no shift. Both are discarded and recreated on
//! every `play()` so audio buffered inside a unit from a previous position
//! can never leak out.
//!
//! **Ownership:** `TrackNodes` are keyed by track id. The active source is
//! replaced on every (re)start, never mutated.

use super::graph::{AudioGraph, NodeId, PitchParams, SourceId};
use crate::error::Result;
use crate::model::{DecodedAudio, Song, Track};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Runtime nodes of one live track
#[derive(Debug, Clone)]
pub struct TrackNodes {
    pub audio: DecodedAudio,
    pub gain: NodeId,
    pub pan: NodeId,
    /// Present only while the track is producing sound
    pub source: Option<SourceId>,
    pub pitch_exempt: bool,
}

/// Primary and bypass pitch/tempo units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchUnits {
    pub primary: NodeId,
    pub bypass: NodeId,
}

impl PitchUnits {
    fn unit_for(&self, pitch_exempt: bool) -> NodeId {
        if pitch_exempt {
            self.bypass
        } else {
            self.primary
        }
    }
}

/// Per-song graph: track chains plus the pitch unit pair
pub struct PlaybackGraph {
    host: Arc<dyn AudioGraph>,
    tracks: HashMap<Uuid, TrackNodes>,
    /// Track start order (song order)
    order: Vec<Uuid>,
    units: Option<PitchUnits>,
}

impl PlaybackGraph {
    pub fn new(host: Arc<dyn AudioGraph>) -> Self {
        Self {
            host,
            tracks: HashMap::new(),
            order: Vec::new(),
            units: None,
        }
    }

    pub fn units(&self) -> Option<PitchUnits> {
        self.units
    }

    pub fn track(&self, track_id: Uuid) -> Option<&TrackNodes> {
        self.tracks.get(&track_id)
    }

    /// Build chains for every track of `song` plus a fresh unit pair
    pub fn attach_song(&mut self, song: &Song) -> Result<()> {
        self.detach_all();
        let units = self.create_units(PitchParams::for_speed(
            song.transport.speed,
            song.transport.pitch_semitones,
        ))?;
        self.units = Some(units);
        for track in &song.tracks {
            self.attach_track(track)?;
        }
        debug!(
            "Attached {} track chains for '{}'",
            self.tracks.len(),
            song.title
        );
        Ok(())
    }

    /// Create one track's gain → pan chain, silent until playback starts
    pub fn attach_track(&mut self, track: &Track) -> Result<()> {
        let gain = self.host.create_gain()?;
        let pan = match self.host.create_pan() {
            Ok(pan) => pan,
            Err(e) => {
                self.host.destroy(gain);
                return Err(e);
            }
        };
        self.host.set_gain(gain, 0.0)?;
        self.host.set_pan(pan, track.pan)?;
        self.host.connect(gain, pan)?;
        if let Some(units) = self.units {
            self.host.connect(pan, units.unit_for(track.pitch_exempt))?;
        }

        if let Some(old) = self.tracks.insert(
            track.id,
            TrackNodes {
                audio: track.audio,
                gain,
                pan,
                source: None,
                pitch_exempt: track.pitch_exempt,
            },
        ) {
            self.release(&old);
        } else {
            self.order.push(track.id);
        }
        Ok(())
    }

    /// Tear down one track's chain
    pub fn detach_track(&mut self, track_id: Uuid) {
        if let Some(nodes) = self.tracks.remove(&track_id) {
            self.release(&nodes);
        }
        self.order.retain(|id| *id != track_id);
    }

    /// Tear down every chain and both units
    pub fn detach_all(&mut self) {
        for (_, nodes) in self.tracks.drain() {
            if let Some(source) = nodes.source {
                self.host.stop_source(source);
            }
            self.host.destroy(nodes.gain);
            self.host.destroy(nodes.pan);
        }
        self.order.clear();
        if let Some(units) = self.units.take() {
            self.host.destroy(units.primary);
            self.host.destroy(units.bypass);
        }
    }

    fn release(&self, nodes: &TrackNodes) {
        if let Some(source) = nodes.source {
            self.host.stop_source(source);
        }
        self.host.destroy(nodes.gain);
        self.host.destroy(nodes.pan);
    }

    fn create_units(&self, params: PitchParams) -> Result<PitchUnits> {
        let primary = self.host.create_pitch_unit()?;
        let bypass = match self.host.create_pitch_unit() {
            Ok(bypass) => bypass,
            Err(e) => {
                self.host.destroy(primary);
                return Err(e);
            }
        };
        let units = PitchUnits { primary, bypass };
        let configured = self.configure_units(units, params).and_then(|()| {
            self.host.connect(primary, self.host.master())?;
            self.host.connect(bypass, self.host.master())
        });
        if let Err(e) = configured {
            self.host.destroy(primary);
            self.host.destroy(bypass);
            return Err(e);
        }
        Ok(units)
    }

    fn configure_units(&self, units: PitchUnits, params: PitchParams) -> Result<()> {
        self.host.set_pitch_params(units.primary, params)?;
        self.host.set_pitch_params(
            units.bypass,
            PitchParams {
                pitch_semitones: 0.0,
                ..params
            },
        )
    }

    /// Discard both units, create fresh ones and reroute every track
    ///
    /// The old pair stays in place if creating the new one fails.
    pub fn recreate_pitch_units(&mut self, speed: f64, pitch_semitones: i32) -> Result<PitchUnits> {
        let fresh = self.create_units(PitchParams::for_speed(speed, pitch_semitones))?;
        for nodes in self.tracks.values() {
            self.host.disconnect(nodes.pan);
            self.host.connect(nodes.pan, fresh.unit_for(nodes.pitch_exempt))?;
        }
        if let Some(old) = self.units.replace(fresh) {
            self.host.destroy(old.primary);
            self.host.destroy(old.bypass);
        }
        debug!(
            "Recreated pitch units (primary {}, bypass {})",
            fresh.primary, fresh.bypass
        );
        Ok(fresh)
    }

    /// Move a track between the primary and bypass units
    pub fn route_track(&mut self, track_id: Uuid, pitch_exempt: bool) -> Result<()> {
        let units = self.units;
        let Some(nodes) = self.tracks.get_mut(&track_id) else {
            return Ok(());
        };
        nodes.pitch_exempt = pitch_exempt;
        if let Some(units) = units {
            self.host.disconnect(nodes.pan);
            self.host.connect(nodes.pan, units.unit_for(pitch_exempt))?;
        }
        Ok(())
    }

    /// Push speed and pitch to both units
    pub fn apply_pitch_params(&self, speed: f64, pitch_semitones: i32) -> Result<()> {
        match self.units {
            Some(units) => {
                self.configure_units(units, PitchParams::for_speed(speed, pitch_semitones))
            }
            None => Ok(()),
        }
    }

    /// Change the rate of every active source
    pub fn apply_playback_rate(&self, speed: f64) -> Result<()> {
        for nodes in self.tracks.values() {
            if let Some(source) = nodes.source {
                self.host.set_playback_rate(source, speed)?;
            }
        }
        Ok(())
    }

    /// Start every track at `offset`, replacing any active sources
    ///
    /// Tracks whose audio ends before `offset` stay silent. Returns the number
    /// of sources started.
    pub fn start_sources(&mut self, offset: f64, speed: f64) -> Result<usize> {
        self.stop_sources();
        let mut started = 0;
        for id in &self.order {
            let Some(nodes) = self.tracks.get_mut(id) else {
                continue;
            };
            if offset >= nodes.audio.duration {
                continue;
            }
            let source =
                self.host
                    .start_source(&nodes.audio, nodes.gain, offset.max(0.0), speed)?;
            nodes.source = Some(source);
            started += 1;
        }
        Ok(started)
    }

    /// Start one track at `offset`, replacing its active source
    ///
    /// Returns false when the track is unknown or its audio ends before `offset`.
    pub fn start_track_source(&mut self, track_id: Uuid, offset: f64, speed: f64) -> Result<bool> {
        let Some(nodes) = self.tracks.get_mut(&track_id) else {
            return Ok(false);
        };
        if let Some(old) = nodes.source.take() {
            self.host.stop_source(old);
        }
        if offset >= nodes.audio.duration {
            return Ok(false);
        }
        let source = self
            .host
            .start_source(&nodes.audio, nodes.gain, offset.max(0.0), speed)?;
        nodes.source = Some(source);
        Ok(true)
    }

    /// Stop every active source immediately
    pub fn stop_sources(&mut self) {
        for nodes in self.tracks.values_mut() {
            if let Some(source) = nodes.source.take() {
                self.host.stop_source(source);
            }
        }
    }

    /// Forget a source the host reported as ended; returns its track
    pub fn source_ended(&mut self, source: SourceId) -> Option<Uuid> {
        let (id, nodes) = self
            .tracks
            .iter_mut()
            .find(|(_, n)| n.source == Some(source))?;
        nodes.source = None;
        Some(*id)
    }

    pub fn has_active_sources(&self) -> bool {
        self.tracks.values().any(|n| n.source.is_some())
    }

    pub fn active_source_count(&self) -> usize {
        self.tracks.values().filter(|n| n.source.is_some()).count()
    }

    /// Set a track gain immediately
    pub fn set_track_gain(&self, track_id: Uuid, value: f32) -> Result<()> {
        match self.tracks.get(&track_id) {
            Some(nodes) => self.host.set_gain(nodes.gain, value),
            None => Ok(()),
        }
    }

    /// Ramp a track gain toward `target` starting now
    pub fn ramp_track_gain(&self, track_id: Uuid, target: f32, time_constant: f64) -> Result<()> {
        match self.tracks.get(&track_id) {
            Some(nodes) => {
                let now = self.host.current_time();
                self.host.cancel_gain_ramps(nodes.gain)?;
                self.host
                    .set_gain_target(nodes.gain, target, now, time_constant)
            }
            None => Ok(()),
        }
    }

    /// Ramp every track gain to silence
    pub fn fade_out_all(&self, time_constant: f64) -> Result<()> {
        for id in &self.order {
            self.ramp_track_gain(*id, 0.0, time_constant)?;
        }
        Ok(())
    }

    pub fn set_track_pan(&self, track_id: Uuid, pan: f32) -> Result<()> {
        match self.tracks.get(&track_id) {
            Some(nodes) => self.host.set_pan(nodes.pan, pan),
            None => Ok(()),
        }
    }

    /// Silence the master output immediately
    pub fn mute_master(&self) -> Result<()> {
        let master = self.host.master();
        self.host.cancel_gain_ramps(master)?;
        self.host.set_gain(master, 0.0)
    }

    /// Bring the master output back after `delay` seconds
    pub fn unmute_master_after(&self, delay: f64, time_constant: f64) -> Result<()> {
        let master = self.host.master();
        let start = self.host.current_time() + delay.max(0.0);
        self.host.set_gain_target(master, 1.0, start, time_constant)
    }
}

impl Drop for PlaybackGraph {
    fn drop(&mut self) {
        if !self.tracks.is_empty() || self.units.is_some() {
            warn!("Playback graph dropped with live nodes; releasing them");
            self.detach_all();
        }
    }
}
