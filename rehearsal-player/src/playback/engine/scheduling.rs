//! Dual scheduler: frame poller and predictive timers
//!
//! **Responsibilities:**
//! - Frame poller lifecycle and per-frame evaluation
//! - Arming one timer per event kind from the next-event computation
//! - Timer expiry handling (re-evaluated with slack, never trusted blindly)
//! - Visibility changes handing authority between the two mechanisms
//! - Applying audibility changes as short gain ramps

use super::core::{ControlEvent, EngineCore, PlaybackEngine};
use crate::error::Result;
use crate::playback::audibility::next_song_mute_boundary;
use crate::playback::decision::{EventKind, NextEvent};
use crate::playback::scheduler::timer_delay;
use crate::playback::tolerance::{BOUNDARY_EPSILON, TIMER_SLACK};
use rehearsal_common::human_time::format_position;
use rehearsal_common::{PlaybackState, RehearsalEvent};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

impl PlaybackEngine {
    /// How early (song seconds) a skip into a disabled section begins
    pub(super) fn lookahead(&self, speed: f64) -> f64 {
        let config = &self.inner.config;
        config
            .preemptive_lookahead_secs()
            .max(config.skip_fade_secs() * speed)
    }

    /// Start the frame poller; frames are coalesced onto the control task
    pub(super) fn start_poller(&self, core: &mut EngineCore) {
        let frame = Arc::clone(&self.inner.frame);
        let period = self.inner.config.frame_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                frame.notify_one();
            }
        });
        core.scheduler.set_poller(handle);
        trace!("Frame poller started ({:?})", period);
    }

    /// Cancel every timer and re-arm from the current position
    pub(super) fn reschedule(&self, core: &mut EngineCore) {
        core.scheduler.cancel_timers();
        if !core.is_steady_playing() {
            return;
        }
        let Some(song) = core.song.as_ref() else {
            return;
        };
        let (song_id, speed) = (song.id, song.transport.speed);
        let position = core.current_position(self.now());
        let event = core.next_event_at(position, self.lookahead(speed));

        match event {
            NextEvent::Skip { .. } | NextEvent::Loop { .. } => {
                if let (Some(kind), Some(trigger)) = (event.kind(), event.trigger_position()) {
                    self.arm_timer(core, kind, trigger, position, speed);
                }
            }
            NextEvent::End { .. } => {
                if self.inner.chain.has_next(song_id) {
                    if let Some(trigger) = event.trigger_position() {
                        self.arm_timer(core, EventKind::End, trigger, position, speed);
                    }
                }
            }
            NextEvent::None => {}
        }

        if !core.visible {
            let boundary = core
                .song
                .as_ref()
                .and_then(|song| next_song_mute_boundary(song, position + BOUNDARY_EPSILON));
            if let Some(boundary) = boundary {
                self.arm_timer(core, EventKind::MuteBoundary, boundary, position, speed);
            }
        }
    }

    fn arm_timer(
        &self,
        core: &mut EngineCore,
        kind: EventKind,
        trigger: f64,
        position: f64,
        speed: f64,
    ) {
        let delay = timer_delay(
            trigger,
            position,
            speed,
            self.inner.config.end_timer_max_delay(),
        );
        let generation = core.scheduler.generation();
        let tx = self.inner.control_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ControlEvent::TimerFired { kind, generation });
        });
        core.scheduler.arm(kind, trigger, handle);
        debug!(
            "Armed {:?} timer for {} in {:?}",
            kind,
            format_position(trigger),
            delay
        );
    }

    /// One poller frame: position, mute ramps, due events
    pub(super) async fn on_frame(&self) {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        if !core.visible || !core.is_steady_playing() || !core.scheduler.poller_running() {
            return;
        }
        let now = self.now();
        let position = core.current_position(now);
        let Some(song) = core.song.as_mut() else {
            return;
        };
        song.transport.position = position;
        let speed = song.transport.speed;

        if let Err(e) = self.apply_audibility(core, position) {
            error!("Failed to apply audibility at {}: {}", format_position(position), e);
        }

        if now - core.last_position_event >= self.inner.config.position_event_interval_secs() {
            self.emit_position(core, position);
        }

        let event = core.next_event_at(position, self.lookahead(speed));
        if event.is_due(position, 0.0) {
            trace!("Frame at {} triggers {:?}", format_position(position), event);
            self.execute_event(core, event);
        }
    }

    /// Predictive timer expiry
    pub(super) async fn on_timer(&self, kind: EventKind, generation: u64) {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        if !core.scheduler.take_fired(kind, generation) {
            trace!("Ignoring superseded {:?} timer", kind);
            return;
        }
        if !core.is_steady_playing() {
            return;
        }
        let position = core.current_position(self.now());
        let Some(song) = core.song.as_mut() else {
            return;
        };
        song.transport.position = position;
        let speed = song.transport.speed;

        if kind == EventKind::MuteBoundary {
            // Evaluated just past the boundary the timer was armed for
            if let Err(e) = self.apply_audibility(core, position + BOUNDARY_EPSILON) {
                error!("Failed to apply audibility at {}: {}", format_position(position), e);
            }
            self.reschedule(core);
            return;
        }

        let event = core.next_event_at(position, self.lookahead(speed));
        if event.is_due(position, TIMER_SLACK) {
            debug!("{:?} timer at {} triggers {:?}", kind, format_position(position), event);
            self.execute_event(core, event);
        } else {
            // Woke early or state moved on; arm again from here
            self.reschedule(core);
        }
    }

    /// Ramp tracks whose audibility changed at `position`
    pub(super) fn apply_audibility(&self, core: &mut EngineCore, position: f64) -> Result<()> {
        let Some(song) = core.song.as_ref() else {
            return Ok(());
        };
        let tau = self.inner.config.mute_ramp_time_constant_secs();
        for change in core.audibility.evaluate(song, position) {
            core.graph
                .ramp_track_gain(change.track_id, change.target_gain, tau)?;
            self.emit(RehearsalEvent::TrackAudibilityChanged {
                song_id: song.id,
                track_id: change.track_id,
                audible: change.audible,
                timestamp: rehearsal_common::time::now(),
            });
        }
        Ok(())
    }

    /// Host foreground/background change
    pub async fn set_visibility(&self, visible: bool) -> Result<()> {
        let mut guard = self.inner.core.lock().await;
        let core = &mut *guard;
        if core.visible == visible {
            return Ok(());
        }
        core.visible = visible;
        info!("Visibility -> {}", if visible { "foreground" } else { "background" });
        self.emit(RehearsalEvent::VisibilityChanged {
            visible,
            timestamp: rehearsal_common::time::now(),
        });

        if visible {
            // The poller resumes authority; no event is handled twice
            core.scheduler.cancel_timers();
            if core.is_steady_playing() {
                self.start_poller(core);
            }
            return Ok(());
        }

        if self.inner.config.pause_when_hidden && core.state == PlaybackState::Playing {
            self.pause_locked(core);
            return Ok(());
        }
        core.scheduler.stop_poller();
        self.reschedule(core);
        Ok(())
    }
}
