//! rehearsal-player specific configuration
//!
//! Every field has a compiled default so a missing or partial TOML file
//! still yields a complete configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "REHEARSAL_CONFIG";

/// Application directory name for platform config lookup
pub const APP_NAME: &str = "rehearsal";

/// Engine timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fade window for skip and loop transitions (wall-clock ms)
    pub skip_fade_ms: u64,

    /// How far ahead of a disabled section a pre-emptive skip begins (song ms)
    pub preemptive_lookahead_ms: u64,

    /// Master mute held before old sources are torn down on `play()`
    pub pre_start_mute_ms: u64,

    /// Master mute held after new sources start, flushing stale DSP buffers
    pub settle_window_ms: u64,

    /// Frame poller interval while the host is foregrounded
    pub frame_interval_ms: u64,

    /// Time constant of mute/solo gain ramps
    pub mute_ramp_time_constant_ms: u64,

    /// Minimum spacing of periodic PositionChanged events while playing
    pub position_event_interval_ms: u64,

    /// Cap on the end-of-content timer delay
    pub end_timer_max_delay_ms: u64,

    /// Pause playback when the host goes to the background
    pub pause_when_hidden: bool,

    /// Event bus channel capacity
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            skip_fade_ms: 30,
            preemptive_lookahead_ms: 50,
            pre_start_mute_ms: 15,
            settle_window_ms: 80,
            frame_interval_ms: 16,
            mute_ramp_time_constant_ms: 12,
            position_event_interval_ms: 250,
            end_timer_max_delay_ms: 600_000,
            pause_when_hidden: false,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Load from a resolved path (or defaults) and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: EngineConfig = rehearsal_common::config::load_toml_or_default(path)?;
        config.validated()
    }

    /// Reject values that would stall the poller or make fades instantaneous
    pub fn validated(self) -> Result<Self> {
        if self.frame_interval_ms == 0 {
            return Err(Error::Config("frame_interval_ms must be > 0".to_string()));
        }
        if self.skip_fade_ms == 0 {
            return Err(Error::Config("skip_fade_ms must be > 0".to_string()));
        }
        if self.mute_ramp_time_constant_ms == 0 {
            return Err(Error::Config(
                "mute_ramp_time_constant_ms must be > 0".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be > 0".to_string()));
        }
        Ok(self)
    }

    pub fn skip_fade_secs(&self) -> f64 {
        self.skip_fade_ms as f64 / 1000.0
    }

    pub fn preemptive_lookahead_secs(&self) -> f64 {
        self.preemptive_lookahead_ms as f64 / 1000.0
    }

    pub fn pre_start_mute(&self) -> Duration {
        Duration::from_millis(self.pre_start_mute_ms)
    }

    pub fn settle_window_secs(&self) -> f64 {
        self.settle_window_ms as f64 / 1000.0
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn mute_ramp_time_constant_secs(&self) -> f64 {
        self.mute_ramp_time_constant_ms as f64 / 1000.0
    }

    pub fn position_event_interval_secs(&self) -> f64 {
        self.position_event_interval_ms as f64 / 1000.0
    }

    pub fn end_timer_max_delay(&self) -> Duration {
        Duration::from_millis(self.end_timer_max_delay_ms)
    }
}
