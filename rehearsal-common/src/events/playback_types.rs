//! Playback-related type definitions
//!
//! Supporting types for transport state and position transitions.

use serde::{Deserialize, Serialize};

/// Playback state enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No sources running; position rests at the last play position
    #[default]
    Stopped,
    /// Sources running, clock anchored
    Playing,
    /// No sources running; position holds where playback was paused
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Non-contiguous position change performed by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// User-requested jump (instantaneous, no fade)
    Seek,
    /// Jump over a disabled arrangement section
    Skip,
    /// Jump from the loop end back to the loop start
    Loop,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionKind::Seek => write!(f, "seek"),
            TransitionKind::Skip => write!(f, "skip"),
            TransitionKind::Loop => write!(f, "loop"),
        }
    }
}
