//! Graph/DSP host interface
//!
//! The engine never renders audio. It drives an external graph host through
//! thread-safe control calls: node creation, routing, gain/pan parameters,
//! pitch/tempo unit controls and playback sources. Every call returns
//! immediately; the host applies it on its own real-time thread.
//!
//! Host callbacks (a source reaching its natural end) arrive as `GraphEvent`s
//! on a channel handed over with `set_event_sink`, and are marshalled back
//! onto the engine's control task.

use crate::error::Result;
use crate::model::DecodedAudio;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

/// Host-side node handle (gain, pan, pitch unit, master)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

/// Host-side playback source handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Pitch/tempo unit controls
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchParams {
    /// Time-stretch factor applied by the unit
    pub tempo: f64,
    /// Coarse pitch shift
    pub pitch_semitones: f64,
    /// Fine pitch correction ratio
    pub fine_ratio: f64,
}

impl PitchParams {
    /// Controls for a unit fed by sources resampled at `speed`
    ///
    /// Sources already run at `speed`, so the unit leaves tempo alone and
    /// only cancels the resampling pitch change (plus any user shift).
    pub fn for_speed(speed: f64, pitch_semitones: i32) -> Self {
        Self {
            tempo: 1.0,
            pitch_semitones: f64::from(pitch_semitones),
            fine_ratio: 1.0 / speed,
        }
    }
}

impl Default for PitchParams {
    fn default() -> Self {
        Self::for_speed(1.0, 0)
    }
}

/// Callbacks raised by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    /// A source played through to the end of its buffer
    SourceEnded { source: SourceId },
}

/// Graph/DSP host
///
/// Implementations must be cheap to call from the engine's control task and
/// must not call back into the engine synchronously.
pub trait AudioGraph: Send + Sync {
    /// Host audio clock (seconds, monotonic)
    fn current_time(&self) -> f64;

    /// Final output gain node, created by the host
    fn master(&self) -> NodeId;

    fn create_gain(&self) -> Result<NodeId>;

    fn create_pan(&self) -> Result<NodeId>;

    /// Create a pitch/tempo processing unit with default controls
    fn create_pitch_unit(&self) -> Result<NodeId>;

    /// Release a node; its connections go with it
    fn destroy(&self, node: NodeId);

    fn connect(&self, from: NodeId, to: NodeId) -> Result<()>;

    /// Remove every outgoing connection of `node`
    fn disconnect(&self, node: NodeId);

    /// Set a gain immediately, cancelling any scheduled ramp
    fn set_gain(&self, node: NodeId, value: f32) -> Result<()>;

    /// Exponentially approach `target` from `start_time` with `time_constant` seconds
    fn set_gain_target(
        &self,
        node: NodeId,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<()>;

    /// Drop scheduled ramps, holding the gain at its current value
    fn cancel_gain_ramps(&self, node: NodeId) -> Result<()>;

    fn set_pan(&self, node: NodeId, pan: f32) -> Result<()>;

    fn set_pitch_params(&self, node: NodeId, params: PitchParams) -> Result<()>;

    /// Start a source over `audio` at `offset` seconds, feeding `destination`
    fn start_source(
        &self,
        audio: &DecodedAudio,
        destination: NodeId,
        offset: f64,
        playback_rate: f64,
    ) -> Result<SourceId>;

    /// Stop a source immediately; no `SourceEnded` is raised for it
    fn stop_source(&self, source: SourceId);

    fn set_playback_rate(&self, source: SourceId, playback_rate: f64) -> Result<()>;

    /// Channel for host callbacks; replaces any previous sink
    fn set_event_sink(&self, sink: mpsc::UnboundedSender<GraphEvent>);
}
