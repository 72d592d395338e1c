//! Skip/loop transitions and end-of-content handling
//!
//! **Responsibilities:**
//! - Faded jumps (disabled-section skips and loop-backs)
//! - Completion of a faded jump after its fade window
//! - Advance-or-stop when no playable content remains
//! - Host source-ended callbacks
//!
//! A skip fades every track out over the fade window, then stops all sources
//! and restarts them at the target from silence. There is nothing to
//! crossfade into: the jump is non-contiguous in source time.

use super::core::{ControlEvent, EngineCore, PlaybackEngine};
use crate::error::{Error, Result};
use crate::playback::arrangement::{Arrangement, LoopTarget};
use crate::playback::clock::PlaybackClock;
use crate::playback::decision::NextEvent;
use crate::playback::graph::SourceId;
use rehearsal_common::human_time::format_position;
use rehearsal_common::ramp::time_constant_for_fade;
use rehearsal_common::{PlaybackState, RehearsalEvent, TransitionKind};
use tracing::{debug, error, info, warn};

impl PlaybackEngine {
    /// Fade out, then restart every track at `target`
    ///
    /// Returns false (doing nothing) when not playing or when another
    /// transition is still in flight.
    pub async fn skip_to_position(&self, target: f64, fade_secs: f64) -> Result<bool> {
        if !target.is_finite() || !fade_secs.is_finite() || fade_secs < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "skip to {} with fade {}",
                target, fade_secs
            )));
        }
        let mut guard = self.inner.core.lock().await;
        self.begin_transition(&mut guard, TransitionKind::Skip, target, fade_secs)
    }

    pub(super) fn begin_transition(
        &self,
        core: &mut EngineCore,
        kind: TransitionKind,
        target: f64,
        fade_secs: f64,
    ) -> Result<bool> {
        if core.state != PlaybackState::Playing {
            debug!("{} to {} refused: not playing", kind, format_position(target));
            return Ok(false);
        }
        let from = core.current_position(self.now());
        let Some(id) = core.transition.begin(kind, from, target) else {
            debug!("{} to {} refused: transition in flight", kind, format_position(target));
            return Ok(false);
        };
        core.scheduler.cancel_all();

        // Poller and timers are gone by now: stop rather than play on unscheduled
        if let Err(e) = core.graph.fade_out_all(time_constant_for_fade(fade_secs)) {
            core.transition.finish(id);
            error!("Failed to fade out for {} to {}: {}", kind, format_position(target), e);
            self.stop_locked(core);
            return Err(e);
        }

        debug!(
            "{} {} -> {} (transition {}, fade {:.0}ms)",
            kind,
            format_position(from),
            format_position(target),
            id,
            fade_secs * 1000.0
        );

        let tx = self.inner.control_tx.clone();
        let fade = rehearsal_common::time::secs_to_duration(fade_secs);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(fade).await;
            // Receiver gone means the engine shut down
            let _ = tx.send(ControlEvent::TransitionDue { id });
        });
        core.transition.attach_completion(id, handle);
        Ok(true)
    }

    /// Finish transition `id` once its fade has elapsed
    pub(super) async fn complete_transition(&self, id: u64) {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;

        // Releasing the slot first keeps failure paths from leaving it claimed
        let Some(active) = core.transition.finish(id) else {
            warn!("Ignoring stale completion of transition {}", id);
            return;
        };
        if core.state != PlaybackState::Playing {
            debug!("Transition {} completed while {}", id, core.state);
            return;
        }

        match self.restart_at(core, active.target) {
            Ok(()) => {
                if let Some(song_id) = core.song_id() {
                    self.emit(RehearsalEvent::TransitionCompleted {
                        song_id,
                        kind: active.kind,
                        from: active.from,
                        to: active.target,
                        timestamp: rehearsal_common::time::now(),
                    });
                }
                self.emit_position(core, active.target);
                if core.visible {
                    self.start_poller(core);
                }
                self.reschedule(core);
            }
            Err(e) => {
                error!("Failed to complete {} to {}: {}", active.kind, active.target, e);
                self.teardown(core);
                self.set_state(core, PlaybackState::Stopped);
            }
        }
    }

    /// Restart every track at `target`, ramping gains up from silence
    fn restart_at(&self, core: &mut EngineCore, target: f64) -> Result<()> {
        let tau = time_constant_for_fade(self.inner.config.skip_fade_secs());
        let Some(song) = core.song.as_mut() else {
            return Ok(());
        };
        let speed = song.transport.speed;

        core.graph.stop_sources();
        core.clock = PlaybackClock::anchor(self.now(), target);
        song.transport.position = target;
        core.graph.start_sources(target, speed)?;

        for change in core.audibility.reset_to(song, target) {
            // Reset explicitly so no earlier ramp target survives
            core.graph.set_track_gain(change.track_id, 0.0)?;
            core.graph.ramp_track_gain(change.track_id, change.target_gain, tau)?;
        }
        Ok(())
    }

    /// Carry out a due event
    pub(super) fn execute_event(&self, core: &mut EngineCore, event: NextEvent) {
        let fade = self.inner.config.skip_fade_secs();
        let result = match event {
            NextEvent::Skip {
                target: Some(target),
                ..
            } => self.begin_transition(core, TransitionKind::Skip, target, fade),
            NextEvent::Loop { target, .. } => {
                self.begin_transition(core, TransitionKind::Loop, target, fade)
            }
            NextEvent::Skip { target: None, .. } | NextEvent::End { .. } => {
                self.advance_or_stop(core);
                Ok(true)
            }
            NextEvent::None => Ok(false),
        };
        if let Err(e) = result {
            error!("Failed to execute {:?}: {}", event, e);
        }
    }

    /// Nothing playable remains: let the chain take over, else stop
    pub(super) fn advance_or_stop(&self, core: &mut EngineCore) {
        let Some(song_id) = core.song_id() else {
            return;
        };
        core.scheduler.cancel_all();

        let advanced = self.inner.chain.try_advance_to_next(song_id);
        if advanced {
            info!("Song {} ended; chain took over", song_id);
            core.awaiting_handoff = true;
        } else {
            info!("Song {} ended; stopping", song_id);
            self.stop_locked(core);
        }
        self.emit(RehearsalEvent::SongEnded {
            song_id,
            advanced,
            timestamp: rehearsal_common::time::now(),
        });
    }

    /// Host callback: a source played to the end of its buffer
    ///
    /// When the last running source ends the song has run out of content.
    pub async fn notify_source_ended(&self, source: SourceId) {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        let Some(track_id) = core.graph.source_ended(source) else {
            debug!("Ignoring end of replaced {}", source);
            return;
        };
        debug!("Track {} source {} ended", track_id, source);

        if !core.is_steady_playing() || core.graph.has_active_sources() {
            return;
        }
        let loop_target = match core.song.as_ref() {
            Some(song) => Arrangement::new(&song.arrangement).resolve_loop(&song.transport),
            None => return,
        };
        match loop_target {
            LoopTarget::Valid { start, .. } => {
                let fade = self.inner.config.skip_fade_secs();
                if let Err(e) = self.begin_transition(core, TransitionKind::Loop, start, fade) {
                    error!("Failed to loop at end of content: {}", e);
                }
            }
            _ => self.advance_or_stop(core),
        }
    }
}
