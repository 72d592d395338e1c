//! Read-only accessors for PlaybackEngine
//!
//! **Responsibilities:**
//! - Derived position and transport state
//! - Whole-engine snapshot for the HTTP layer
//! - Scheduler introspection (used by diagnostics and tests)

use super::core::PlaybackEngine;
use crate::error::{Error, Result};
use crate::model::{ArrangementSection, MuteSection};
use crate::playback::audibility::is_audible;
use crate::playback::decision::EventKind;
use rehearsal_common::{PlaybackState, TransitionKind};
use serde::Serialize;
use uuid::Uuid;

/// Per-track part of a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct TrackSnapshot {
    pub id: Uuid,
    pub name: String,
    pub duration: f64,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub pitch_exempt: bool,
    pub audible: bool,
    pub mute_sections: Vec<MuteSection>,
}

/// Transition currently fading
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TransitionSnapshot {
    pub kind: TransitionKind,
    pub from: f64,
    pub target: f64,
}

/// Loaded song and transport, as seen now
#[derive(Debug, Clone, Serialize)]
pub struct SongSnapshot {
    pub id: Uuid,
    pub title: String,
    pub duration: f64,
    pub position: f64,
    pub last_play_position: f64,
    pub speed: f64,
    pub pitch_semitones: i32,
    pub loop_enabled: bool,
    pub loop_start: Option<f64>,
    pub loop_end: Option<f64>,
    pub arrangement: Vec<ArrangementSection>,
    pub tracks: Vec<TrackSnapshot>,
}

/// Engine state for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub state: PlaybackState,
    pub visible: bool,
    pub song: Option<SongSnapshot>,
    pub transition: Option<TransitionSnapshot>,
    pub awaiting_handoff: bool,
    pub armed_timers: Vec<EventKind>,
    pub poller_running: bool,
}

impl PlaybackEngine {
    /// Current song position (derived from the clock while playing)
    pub async fn position(&self) -> f64 {
        let core = self.inner.core.lock().await;
        core.current_position(self.now())
    }

    pub async fn state(&self) -> PlaybackState {
        self.inner.core.lock().await.state
    }

    pub async fn song_id(&self) -> Option<Uuid> {
        self.inner.core.lock().await.song_id()
    }

    /// Whether `track_id` is audible at the current position
    pub async fn track_audibility(&self, track_id: Uuid) -> Result<bool> {
        let core = self.inner.core.lock().await;
        let position = core.current_position(self.now());
        let song = core
            .song
            .as_ref()
            .ok_or_else(|| Error::NotFound("no song loaded".to_string()))?;
        let track = song
            .track(track_id)
            .ok_or_else(|| Error::NotFound(format!("track {}", track_id)))?;
        Ok(is_audible(track, song.any_solo(), position))
    }

    pub async fn is_transition_active(&self) -> bool {
        self.inner.core.lock().await.transition.is_active()
    }

    /// Whether a predictive timer of `kind` is armed
    pub async fn is_timer_armed(&self, kind: EventKind) -> bool {
        self.inner.core.lock().await.scheduler.is_armed(kind)
    }

    pub async fn is_poller_running(&self) -> bool {
        self.inner.core.lock().await.scheduler.poller_running()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        let core = self.inner.core.lock().await;
        let position = core.current_position(self.now());

        let song = core.song.as_ref().map(|song| {
            let any_solo = song.any_solo();
            SongSnapshot {
                id: song.id,
                title: song.title.clone(),
                duration: song.duration(),
                position,
                last_play_position: song.transport.last_play_position,
                speed: song.transport.speed,
                pitch_semitones: song.transport.pitch_semitones,
                loop_enabled: song.transport.loop_enabled,
                loop_start: song.transport.loop_start,
                loop_end: song.transport.loop_end,
                arrangement: song.arrangement.clone(),
                tracks: song
                    .tracks
                    .iter()
                    .map(|t| TrackSnapshot {
                        id: t.id,
                        name: t.name.clone(),
                        duration: t.audio.duration,
                        volume: t.volume,
                        pan: t.pan,
                        muted: t.muted,
                        solo: t.solo,
                        pitch_exempt: t.pitch_exempt,
                        audible: is_audible(t, any_solo, position),
                        mute_sections: t.mute_sections.clone(),
                    })
                    .collect(),
            }
        });

        let armed_timers = [
            EventKind::Skip,
            EventKind::Loop,
            EventKind::End,
            EventKind::MuteBoundary,
        ]
        .into_iter()
        .filter(|k| core.scheduler.is_armed(*k))
        .collect();

        EngineSnapshot {
            state: core.state,
            visible: core.visible,
            song,
            transition: core.transition.active().map(|a| TransitionSnapshot {
                kind: a.kind,
                from: a.from,
                target: a.target,
            }),
            awaiting_handoff: core.awaiting_handoff,
            armed_timers,
            poller_running: core.scheduler.poller_running(),
        }
    }
}
