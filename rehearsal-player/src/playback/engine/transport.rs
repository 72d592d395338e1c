//! Transport control methods for PlaybackEngine
//!
//! **Responsibilities:**
//! - Play/pause/stop state machine
//! - Instantaneous seek (restart inline while playing)
//! - Speed and pitch changes without position jumps

use super::core::{EngineCore, PlaybackEngine};
use crate::error::Result;
use crate::model::{validate_pitch, validate_speed};
use crate::playback::arrangement::Arrangement;
use crate::playback::clock::PlaybackClock;
use crate::playback::transition::PlayGuard;
use crate::playback::tolerance::END_OF_CONTENT_EPSILON;
use rehearsal_common::human_time::format_position;
use rehearsal_common::{PlaybackState, RehearsalEvent, TransitionKind};
use tracing::{debug, info, warn};

impl PlaybackEngine {
    /// Start playback at `position`, or at the transport position
    ///
    /// A second call while one is still starting is a no-op, as is `play()`
    /// without a position while already playing.
    pub async fn play(&self, position: Option<f64>) -> Result<()> {
        let Some(_guard) = PlayGuard::try_acquire(&self.inner.play_in_progress) else {
            debug!("play() already in progress; ignoring");
            return Ok(());
        };
        let mut guard = self.inner.core.lock().await;
        self.play_locked(&mut guard, position, true).await
    }

    /// Body of `play()`; `pre_mute` waits out the pre-start mute window
    pub(super) async fn play_locked(
        &self,
        core: &mut EngineCore,
        position: Option<f64>,
        pre_mute: bool,
    ) -> Result<()> {
        let Some(song) = core.song.as_ref() else {
            debug!("play() with no song loaded");
            return Ok(());
        };
        if song.tracks.is_empty() || song.duration() <= 0.0 {
            debug!("play() on '{}' with no audio", song.title);
            return Ok(());
        }
        if core.state == PlaybackState::Playing && position.is_none() {
            debug!("play() while already playing");
            return Ok(());
        }

        let duration = song.duration();
        let mut requested = position.unwrap_or(song.transport.position).max(0.0);
        if requested >= duration - END_OF_CONTENT_EPSILON {
            debug!("Requested position at end of content; restarting from 0");
            requested = 0.0;
        }

        let Some(start) = Arrangement::new(&song.arrangement).resolve_play_start(requested) else {
            info!(
                "No enabled section at or after {}",
                format_position(requested)
            );
            self.teardown(core);
            if let Some(song) = core.song.as_mut() {
                song.transport.position = requested;
            }
            self.set_state(core, PlaybackState::Stopped);
            self.advance_or_stop(core);
            return Ok(());
        };

        self.teardown(core);
        core.graph.mute_master()?;
        if pre_mute {
            tokio::time::sleep(self.inner.config.pre_start_mute()).await;
        }

        if let Err(e) = self.start_sources_at(core, start) {
            warn!("Failed to start playback: {}", e);
            core.graph.stop_sources();
            self.set_state(core, PlaybackState::Stopped);
            return Err(e);
        }

        if let Some(song) = core.song.as_mut() {
            song.transport.last_play_position = start;
        }
        core.graph.unmute_master_after(
            self.inner.config.settle_window_secs(),
            self.inner.config.mute_ramp_time_constant_secs(),
        )?;

        self.set_state(core, PlaybackState::Playing);
        self.emit_position(core, start);
        if core.visible {
            self.start_poller(core);
        }
        self.reschedule(core);
        Ok(())
    }

    /// Fresh pitch units, anchored clock, sources and gains at `start`
    fn start_sources_at(&self, core: &mut EngineCore, start: f64) -> Result<()> {
        let Some(song) = core.song.as_mut() else {
            return Ok(());
        };
        let (speed, pitch) = (song.transport.speed, song.transport.pitch_semitones);

        core.graph.stop_sources();
        core.graph.recreate_pitch_units(speed, pitch)?;

        core.clock = PlaybackClock::anchor(self.now(), start);
        song.transport.position = start;
        let started = core.graph.start_sources(start, speed)?;

        for change in core.audibility.reset_to(song, start) {
            core.graph.set_track_gain(change.track_id, change.target_gain)?;
        }
        info!(
            "Started {} sources for '{}' at {} (speed {:.2}, pitch {:+})",
            started,
            song.title,
            format_position(start),
            speed,
            pitch
        );
        Ok(())
    }

    /// Pause, keeping the position reached
    pub async fn pause(&self) -> Result<()> {
        let mut guard = self.inner.core.lock().await;
        self.pause_locked(&mut guard);
        Ok(())
    }

    pub(super) fn pause_locked(&self, core: &mut EngineCore) {
        if core.state != PlaybackState::Playing {
            debug!("pause() while {}", core.state);
            return;
        }
        let position = core.current_position(self.now());
        self.teardown(core);
        if let Some(song) = core.song.as_mut() {
            song.transport.position = position;
        }
        self.set_state(core, PlaybackState::Paused);
        self.emit_position(core, position);
    }

    /// Stop and return to the position of the most recent `play()`
    pub async fn stop(&self) -> Result<()> {
        let mut guard = self.inner.core.lock().await;
        self.stop_locked(&mut guard);
        Ok(())
    }

    pub(super) fn stop_locked(&self, core: &mut EngineCore) {
        if core.state == PlaybackState::Stopped {
            debug!("stop() while already stopped");
            return;
        }
        self.teardown(core);
        let Some(song) = core.song.as_mut() else {
            return;
        };
        song.transport.position = song.transport.last_play_position;
        let position = song.transport.position;
        self.set_state(core, PlaybackState::Stopped);
        self.emit_position(core, position);
    }

    /// Jump to `position`; instantaneous, restarting inline when playing
    ///
    /// A seek supersedes any skip/loop transition still fading.
    pub async fn seek(&self, position: f64) -> Result<()> {
        if !position.is_finite() {
            return Err(crate::error::Error::InvalidParameter(format!(
                "seek position {}",
                position
            )));
        }
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let Some(song) = core.song.as_ref() else {
            debug!("seek() with no song loaded");
            return Ok(());
        };
        let position = position.clamp(0.0, song.duration());
        info!("Seek to {}", format_position(position));

        if core.state != PlaybackState::Playing {
            if let Some(song) = core.song.as_mut() {
                song.transport.position = position;
            }
            self.emit_position(core, position);
            return Ok(());
        }

        let from = core.current_position(self.now());
        self.teardown(core);
        self.play_locked(core, Some(position), false).await?;

        if let Some(song) = core.song.as_ref() {
            self.emit(RehearsalEvent::TransitionCompleted {
                song_id: song.id,
                kind: TransitionKind::Seek,
                from,
                to: song.transport.position,
                timestamp: rehearsal_common::time::now(),
            });
        }
        Ok(())
    }

    /// Change playback speed; the reported position does not jump
    pub async fn set_speed(&self, speed: f64) -> Result<()> {
        let speed = validate_speed(speed)?;
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let now = self.now();
        let Some(song) = core.song.as_mut() else {
            debug!("set_speed() with no song loaded");
            return Ok(());
        };
        let old_speed = song.transport.speed;
        if (old_speed - speed).abs() < f64::EPSILON {
            return Ok(());
        }

        if core.state == PlaybackState::Playing {
            core.clock = core.clock.rebased(now, old_speed);
        }
        song.transport.speed = speed;
        let pitch = song.transport.pitch_semitones;
        info!("Speed {:.2} -> {:.2}", old_speed, speed);

        core.graph.apply_playback_rate(speed)?;
        core.graph.apply_pitch_params(speed, pitch)?;
        self.emit_transport_params(core);
        if core.state == PlaybackState::Playing {
            self.reschedule(core);
        }
        Ok(())
    }

    /// Change pitch shift (primary unit only)
    pub async fn set_pitch(&self, semitones: i32) -> Result<()> {
        let semitones = validate_pitch(semitones)?;
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let Some(song) = core.song.as_mut() else {
            debug!("set_pitch() with no song loaded");
            return Ok(());
        };
        if song.transport.pitch_semitones == semitones {
            return Ok(());
        }
        song.transport.pitch_semitones = semitones;
        let speed = song.transport.speed;
        info!("Pitch {:+} semitones", semitones);

        core.graph.apply_pitch_params(speed, semitones)?;
        self.emit_transport_params(core);
        Ok(())
    }

    fn emit_transport_params(&self, core: &EngineCore) {
        if let Some(song) = core.song.as_ref() {
            self.emit(RehearsalEvent::TransportParamsChanged {
                song_id: song.id,
                speed: song.transport.speed,
                pitch_semitones: song.transport.pitch_semitones,
                timestamp: rehearsal_common::time::now(),
            });
        }
    }
}
