//! Song, arrangement, loop and track editing for PlaybackEngine
//!
//! **Responsibilities:**
//! - Loading/unloading songs onto the live graph
//! - Arrangement and loop edits (re-derive scheduled events)
//! - Track mixer flags, routing and time-range mutes
//!
//! Commands with no song loaded are no-ops; unknown tracks and sections are
//! `NotFound`.

use super::core::{EngineCore, PlaybackEngine};
use crate::error::{Error, Result};
use crate::model::{
    validate_arrangement, validate_mute_sections, ArrangementSection, MuteSection, Song, Track,
};
use crate::playback::audibility::{is_audible, target_gain};
use rehearsal_common::human_time::format_optional_position;
use rehearsal_common::{PlaybackState, RehearsalEvent};
use tracing::{debug, info};
use uuid::Uuid;

impl PlaybackEngine {
    /// Attach `song` to the graph, replacing any loaded song
    pub async fn load_song(&self, mut song: Song) -> Result<()> {
        // A song with no audio has nothing to arrange; play() ignores it
        if song.arrangement.is_empty() && song.duration() > 0.0 {
            song.arrangement = vec![ArrangementSection::new(0.0, song.duration(), true)];
        }
        if !song.arrangement.is_empty() {
            validate_arrangement(&song.arrangement)?;
        }
        for track in &song.tracks {
            validate_mute_sections(&track.mute_sections)?;
        }

        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        self.unload_locked(core);

        core.graph.attach_song(&song)?;
        info!(
            "Loaded '{}' ({} tracks, {:.1}s)",
            song.title,
            song.tracks.len(),
            song.duration()
        );
        self.emit(RehearsalEvent::SongLoaded {
            song_id: song.id,
            title: song.title.clone(),
            duration: song.duration(),
            track_count: song.tracks.len(),
            timestamp: rehearsal_common::time::now(),
        });
        core.song = Some(song);
        core.state = PlaybackState::Stopped;
        Ok(())
    }

    /// Detach the loaded song and release its nodes
    pub async fn unload_song(&self) -> Result<()> {
        let mut guard = self.inner.core.lock().await;
        self.unload_locked(&mut guard);
        Ok(())
    }

    fn unload_locked(&self, core: &mut EngineCore) {
        if core.song.is_none() {
            return;
        }
        self.stop_locked(core);
        self.teardown(core);
        core.graph.detach_all();
        if let Some(song) = core.song.take() {
            info!("Unloaded '{}'", song.title);
            self.emit(RehearsalEvent::SongUnloaded {
                song_id: song.id,
                timestamp: rehearsal_common::time::now(),
            });
        }
        core.state = PlaybackState::Stopped;
    }

    /// Replace the arrangement
    pub async fn set_arrangement(&self, sections: Vec<ArrangementSection>) -> Result<()> {
        validate_arrangement(&sections)?;
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let Some(song) = core.song.as_mut() else {
            debug!("set_arrangement() with no song loaded");
            return Ok(());
        };
        song.arrangement = sections;
        self.arrangement_changed(core);
        Ok(())
    }

    /// Flip one section between enabled and disabled
    pub async fn toggle_arrangement_section(&self, index: usize) -> Result<bool> {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let Some(song) = core.song.as_mut() else {
            debug!("toggle_arrangement_section() with no song loaded");
            return Ok(false);
        };
        let section = song
            .arrangement
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("arrangement section {}", index)))?;
        section.enabled = !section.enabled;
        let enabled = section.enabled;
        self.arrangement_changed(core);
        Ok(enabled)
    }

    fn arrangement_changed(&self, core: &mut EngineCore) {
        let Some(song) = core.song.as_ref() else {
            return;
        };
        let enabled = song.arrangement.iter().filter(|s| s.enabled).count();
        info!(
            "Arrangement updated: {}/{} sections enabled",
            enabled,
            song.arrangement.len()
        );
        self.emit(RehearsalEvent::ArrangementChanged {
            song_id: song.id,
            sections: song.arrangement.clone(),
            timestamp: rehearsal_common::time::now(),
        });
        self.reschedule(core);
    }

    /// Set loop bounds and enable looping
    pub async fn set_loop(&self, start: f64, end: f64) -> Result<()> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(Error::InvalidParameter(format!(
                "loop [{}, {}) is empty or negative",
                start, end
            )));
        }
        self.edit_loop(|t| {
            t.loop_start = Some(start);
            t.loop_end = Some(end);
            t.loop_enabled = true;
        })
        .await
    }

    pub async fn set_loop_enabled(&self, enabled: bool) -> Result<()> {
        self.edit_loop(|t| t.loop_enabled = enabled).await
    }

    /// Disable looping and forget the bounds
    pub async fn clear_loop(&self) -> Result<()> {
        self.edit_loop(|t| {
            t.loop_enabled = false;
            t.loop_start = None;
            t.loop_end = None;
        })
        .await
    }

    async fn edit_loop(&self, edit: impl FnOnce(&mut crate::model::Transport)) -> Result<()> {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let Some(song) = core.song.as_mut() else {
            debug!("Loop edit with no song loaded");
            return Ok(());
        };
        edit(&mut song.transport);
        let t = &song.transport;
        info!(
            "Loop {} [{}, {})",
            if t.loop_enabled { "on" } else { "off" },
            format_optional_position(t.loop_start),
            format_optional_position(t.loop_end)
        );
        self.emit(RehearsalEvent::LoopUpdated {
            song_id: song.id,
            enabled: t.loop_enabled,
            start: t.loop_start,
            end: t.loop_end,
            timestamp: rehearsal_common::time::now(),
        });
        self.reschedule(core);
        Ok(())
    }

    /// Attach a track to the loaded song
    ///
    /// While playing the track joins in place at the current position.
    pub async fn add_track(&self, track: Track) -> Result<()> {
        validate_mute_sections(&track.mute_sections)?;
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let position = core.current_position(self.now());
        let Some(song) = core.song.as_mut() else {
            debug!("add_track() with no song loaded");
            return Ok(());
        };
        if song.track(track.id).is_some() {
            return Err(Error::InvalidParameter(format!(
                "track {} is already loaded",
                track.id
            )));
        }

        core.graph.attach_track(&track)?;
        info!("Added track '{}' to '{}'", track.name, song.title);
        self.emit(RehearsalEvent::TrackAdded {
            song_id: song.id,
            track_id: track.id,
            name: track.name.clone(),
            duration: track.audio.duration,
            timestamp: rehearsal_common::time::now(),
        });
        let (track_id, speed) = (track.id, song.transport.speed);
        song.tracks.push(track);
        if song.arrangement.is_empty() && song.duration() > 0.0 {
            song.arrangement = vec![ArrangementSection::new(0.0, song.duration(), true)];
        }

        // A fading transition restarts every track, this one included
        if core.state == PlaybackState::Playing && !core.transition.is_active() {
            core.graph.start_track_source(track_id, position, speed)?;
        }
        self.refresh_gains(core)?;
        self.reschedule(core);
        Ok(())
    }

    /// Detach a track and release its nodes
    ///
    /// Removing the last sounding track ends the song the same way running
    /// out of audio does.
    pub async fn remove_track(&self, track_id: Uuid) -> Result<()> {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let Some(song) = core.song.as_mut() else {
            debug!("remove_track() with no song loaded");
            return Ok(());
        };
        let index = song
            .tracks
            .iter()
            .position(|t| t.id == track_id)
            .ok_or_else(|| Error::NotFound(format!("track {}", track_id)))?;
        let track = song.tracks.remove(index);
        let song_id = song.id;

        core.graph.detach_track(track_id);
        core.audibility.forget(track_id);
        info!("Removed track '{}'", track.name);
        self.emit(RehearsalEvent::TrackRemoved {
            song_id,
            track_id,
            timestamp: rehearsal_common::time::now(),
        });

        if core.is_steady_playing() && !core.graph.has_active_sources() {
            self.advance_or_stop(core);
            return Ok(());
        }
        self.refresh_gains(core)?;
        self.reschedule(core);
        Ok(())
    }

    pub async fn set_track_muted(&self, track_id: Uuid, muted: bool) -> Result<()> {
        self.edit_track(track_id, |t| t.muted = muted).await
    }

    pub async fn set_track_solo(&self, track_id: Uuid, solo: bool) -> Result<()> {
        self.edit_track(track_id, |t| t.solo = solo).await
    }

    pub async fn set_track_volume(&self, track_id: Uuid, volume: f32) -> Result<()> {
        if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
            return Err(Error::InvalidParameter(format!("volume {} outside [0, 1]", volume)));
        }
        self.edit_track(track_id, |t| t.volume = volume).await
    }

    pub async fn set_track_pan(&self, track_id: Uuid, pan: f32) -> Result<()> {
        if !pan.is_finite() || !(-1.0..=1.0).contains(&pan) {
            return Err(Error::InvalidParameter(format!("pan {} outside [-1, 1]", pan)));
        }
        self.edit_track(track_id, |t| t.pan = pan).await
    }

    /// Route a track through the bypass unit (no pitch shift) or the primary one
    pub async fn set_track_pitch_exempt(&self, track_id: Uuid, pitch_exempt: bool) -> Result<()> {
        self.edit_track(track_id, |t| t.pitch_exempt = pitch_exempt).await
    }

    async fn edit_track(&self, track_id: Uuid, edit: impl FnOnce(&mut Track)) -> Result<()> {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let Some(song) = core.song.as_mut() else {
            debug!("Track edit with no song loaded");
            return Ok(());
        };
        let song_id = song.id;
        let track = song.track_mut(track_id)?;
        let was_exempt = track.pitch_exempt;
        edit(track);
        let track = track.clone();

        core.graph.set_track_pan(track_id, track.pan)?;
        if track.pitch_exempt != was_exempt {
            core.graph.route_track(track_id, track.pitch_exempt)?;
        }
        debug!(
            "Track '{}': muted={} solo={} volume={:.2} pan={:+.2} pitch_exempt={}",
            track.name, track.muted, track.solo, track.volume, track.pan, track.pitch_exempt
        );
        self.emit(RehearsalEvent::TrackStateChanged {
            song_id,
            track_id,
            muted: track.muted,
            solo: track.solo,
            volume: track.volume,
            pan: track.pan,
            pitch_exempt: track.pitch_exempt,
            timestamp: rehearsal_common::time::now(),
        });
        self.refresh_gains(core)
    }

    /// Flip one of a track's time-range mutes
    pub async fn toggle_section_mute(&self, track_id: Uuid, index: usize) -> Result<bool> {
        let mut muted = false;
        self.edit_mute_sections(track_id, |sections| {
            let section = sections.get_mut(index).ok_or_else(|| {
                Error::NotFound(format!("mute section {} of track {}", index, track_id))
            })?;
            section.muted = !section.muted;
            muted = section.muted;
            Ok(())
        })
        .await?;
        Ok(muted)
    }

    /// Replace a track's time-range mutes
    pub async fn set_mute_sections(&self, track_id: Uuid, sections: Vec<MuteSection>) -> Result<()> {
        validate_mute_sections(&sections)?;
        self.edit_mute_sections(track_id, |current| {
            *current = sections;
            Ok(())
        })
        .await
    }

    async fn edit_mute_sections(
        &self,
        track_id: Uuid,
        edit: impl FnOnce(&mut Vec<MuteSection>) -> Result<()>,
    ) -> Result<()> {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let Some(song) = core.song.as_mut() else {
            debug!("Mute section edit with no song loaded");
            return Ok(());
        };
        let song_id = song.id;
        let track = song.track_mut(track_id)?;
        edit(&mut track.mute_sections)?;
        self.emit(RehearsalEvent::MuteSectionsChanged {
            song_id,
            track_id,
            sections: track.mute_sections.clone(),
            timestamp: rehearsal_common::time::now(),
        });
        self.refresh_gains(core)?;
        self.reschedule(core);
        Ok(())
    }

    /// Re-ramp every track to its current target gain while playing
    ///
    /// Mixer edits change targets even when audibility does not (volume), so
    /// every track is ramped; audibility events fire only on real changes.
    fn refresh_gains(&self, core: &mut EngineCore) -> Result<()> {
        if core.state != PlaybackState::Playing || core.transition.is_active() {
            return Ok(());
        }
        let position = core.current_position(self.now());
        let Some(song) = core.song.as_ref() else {
            return Ok(());
        };
        let tau = self.inner.config.mute_ramp_time_constant_secs();
        let any_solo = song.any_solo();
        for track in &song.tracks {
            let audible = is_audible(track, any_solo, position);
            core.graph
                .ramp_track_gain(track.id, target_gain(track, audible), tau)?;
            if core.audibility.last_applied(track.id) != Some(audible) {
                core.audibility.record(track.id, audible);
                self.emit(RehearsalEvent::TrackAudibilityChanged {
                    song_id: song.id,
                    track_id: track.id,
                    audible,
                    timestamp: rehearsal_common::time::now(),
                });
            }
        }
        Ok(())
    }
}
