//! Exponential-approach gain ramps
//!
//! Gain changes are never applied as steps: a step in gain is an audible
//! click. Instead the parameter approaches its target exponentially,
//! `v(t) = target + (start - target) * e^(-(t - t0) / tau)`, which is the
//! automation shape audio hosts expose as "set target at time".
//!
//! The time constant `tau` controls speed: after `tau` the remaining
//! distance is ~37%, after `3 * tau` ~5%, after `5 * tau` under 1%.

use serde::{Deserialize, Serialize};

/// Number of time constants that fit in a fade so the ramp is ~95% complete
/// when the fade window closes.
pub const TIME_CONSTANTS_PER_FADE: f64 = 3.0;

/// Time constant for a fade that should be substantially complete after `fade_secs`
pub fn time_constant_for_fade(fade_secs: f64) -> f64 {
    (fade_secs / TIME_CONSTANTS_PER_FADE).max(f64::EPSILON)
}

/// Time for an exponential ramp to close all but `residual` of its distance
///
/// `residual` is a fraction in (0, 1), e.g. 0.01 for "within 1%".
pub fn settle_time(time_constant: f64, residual: f64) -> f64 {
    let residual = residual.clamp(f64::MIN_POSITIVE, 1.0);
    -time_constant * residual.ln()
}

/// Value of an exponential approach `elapsed` seconds after it started
pub fn approach_value(start: f32, target: f32, elapsed: f64, time_constant: f64) -> f32 {
    if elapsed <= 0.0 {
        return start;
    }
    if time_constant <= 0.0 {
        return target;
    }
    let decay = (-elapsed / time_constant).exp() as f32;
    target + (start - target) * decay
}

/// A scheduled exponential ramp on a single parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainRamp {
    /// Value the parameter held when the ramp was scheduled
    pub start_value: f32,
    /// Value the ramp approaches
    pub target: f32,
    /// Host clock time the ramp begins (seconds)
    pub start_time: f64,
    /// Exponential time constant (seconds)
    pub time_constant: f64,
}

impl GainRamp {
    pub fn new(start_value: f32, target: f32, start_time: f64, time_constant: f64) -> Self {
        Self {
            start_value,
            target,
            start_time,
            time_constant,
        }
    }

    /// Parameter value at host clock time `now`
    pub fn value_at(&self, now: f64) -> f32 {
        approach_value(
            self.start_value,
            self.target,
            now - self.start_time,
            self.time_constant,
        )
    }
}
