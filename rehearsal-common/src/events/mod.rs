//! Event types for the rehearsal player event system
//!
//! Provides shared event definitions and the EventBus used by the engine to
//! publish every observable state change to UI and persistence clients.

mod playback_types;
mod shared_types;

pub use playback_types::{PlaybackState, TransitionKind};
pub use shared_types::{ArrangementSection, MuteSection};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Rehearsal player event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
/// All events use this central enum for type safety and exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RehearsalEvent {
    /// Song attached to the live graph
    SongLoaded {
        song_id: Uuid,
        title: String,
        /// Longest track duration (seconds)
        duration: f64,
        track_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Song detached from the live graph
    SongUnloaded {
        song_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback state changed (Stopped / Playing / Paused)
    ///
    /// Triggers:
    /// - SSE: Update UI transport controls
    /// - Persistence: Save transport position
    PlaybackStateChanged {
        song_id: Uuid,
        old_state: PlaybackState,
        new_state: PlaybackState,
        /// Transport position after the change (seconds)
        position: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transport position update
    ///
    /// Emitted periodically while playing (configurable interval) and
    /// immediately after every seek, skip and loop.
    PositionChanged {
        song_id: Uuid,
        position: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Non-contiguous jump finished and playback is steady at `to`
    TransitionCompleted {
        song_id: Uuid,
        kind: TransitionKind,
        from: f64,
        to: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Speed or pitch changed
    TransportParamsChanged {
        song_id: Uuid,
        speed: f64,
        pitch_semitones: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Loop region edited or toggled
    LoopUpdated {
        song_id: Uuid,
        enabled: bool,
        start: Option<f64>,
        end: Option<f64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Arrangement sections edited
    ArrangementChanged {
        song_id: Uuid,
        sections: Vec<ArrangementSection>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track attached to the loaded song
    TrackAdded {
        song_id: Uuid,
        track_id: Uuid,
        name: String,
        duration: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track detached and its nodes released
    TrackRemoved {
        song_id: Uuid,
        track_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track mixer flags changed
    TrackStateChanged {
        song_id: Uuid,
        track_id: Uuid,
        muted: bool,
        solo: bool,
        volume: f32,
        pan: f32,
        pitch_exempt: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Per-track time-range mutes edited
    MuteSectionsChanged {
        song_id: Uuid,
        track_id: Uuid,
        sections: Vec<MuteSection>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track became audible or silent (solo/mute/time-range mute)
    TrackAudibilityChanged {
        song_id: Uuid,
        track_id: Uuid,
        audible: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Reached end of playable content
    ///
    /// `advanced` is true when the chain collaborator took over playback.
    SongEnded {
        song_id: Uuid,
        advanced: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Host reported foreground/background change
    VisibilityChanged {
        visible: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl RehearsalEvent {
    /// Event name used for SSE `event:` fields
    pub fn event_type(&self) -> &'static str {
        match self {
            RehearsalEvent::SongLoaded { .. } => "SongLoaded",
            RehearsalEvent::SongUnloaded { .. } => "SongUnloaded",
            RehearsalEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            RehearsalEvent::PositionChanged { .. } => "PositionChanged",
            RehearsalEvent::TransitionCompleted { .. } => "TransitionCompleted",
            RehearsalEvent::TransportParamsChanged { .. } => "TransportParamsChanged",
            RehearsalEvent::LoopUpdated { .. } => "LoopUpdated",
            RehearsalEvent::ArrangementChanged { .. } => "ArrangementChanged",
            RehearsalEvent::TrackAdded { .. } => "TrackAdded",
            RehearsalEvent::TrackRemoved { .. } => "TrackRemoved",
            RehearsalEvent::TrackStateChanged { .. } => "TrackStateChanged",
            RehearsalEvent::MuteSectionsChanged { .. } => "MuteSectionsChanged",
            RehearsalEvent::TrackAudibilityChanged { .. } => "TrackAudibilityChanged",
            RehearsalEvent::SongEnded { .. } => "SongEnded",
            RehearsalEvent::VisibilityChanged { .. } => "VisibilityChanged",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use rehearsal_common::events::{EventBus, RehearsalEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(RehearsalEvent::VisibilityChanged {
///     visible: false,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(RehearsalEvent::VisibilityChanged { visible: false, .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RehearsalEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RehearsalEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: RehearsalEvent,
    ) -> Result<usize, broadcast::error::SendError<RehearsalEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RehearsalEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(RehearsalEvent::VisibilityChanged {
            visible: true,
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let song_id = Uuid::new_v4();

        bus.emit_lossy(RehearsalEvent::PositionChanged {
            song_id,
            position: 12.5,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            RehearsalEvent::PositionChanged { song_id: id, position, .. } => {
                assert_eq!(id, song_id);
                assert_eq!(position, 12.5);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RehearsalEvent::SongEnded {
            song_id: Uuid::nil(),
            advanced: true,
            timestamp: chrono::Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SongEnded");
        assert_eq!(json["advanced"], true);
        assert_eq!(event.event_type(), "SongEnded");
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        let _a = bus.subscribe();
        let _b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        assert_eq!(bus.capacity(), 4);
    }
}
