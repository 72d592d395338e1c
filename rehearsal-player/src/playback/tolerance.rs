//! Floating-point tolerance constants for position comparisons
//!
//! All values are in seconds of song (virtual) time unless noted. Every
//! skip/loop/end threshold in the engine goes through one of these so the
//! frame poller and the predictive timers agree on what "at the boundary"
//! means.

/// Two positions closer than this are the same boundary.
///
/// Absorbs accumulated error from `anchor + elapsed * speed`.
pub const BOUNDARY_EPSILON: f64 = 0.001;

/// Distance from the end of content at which playback counts as finished.
///
/// Tracks rarely end on an exact frame boundary of the poller; without this
/// the last partial frame would never register as "at the end".
pub const END_OF_CONTENT_EPSILON: f64 = 0.02;

/// How far past `loop_end` arrival still triggers the loop.
///
/// Covers a throttled frame or a late timer. Positions further past were
/// reached deliberately (seek) and must not loop.
pub const LOOP_END_TOLERANCE: f64 = 0.1;

/// Early/late allowance when a predictive timer fires.
///
/// Timers are armed for the exact moment an event becomes due; host timer
/// granularity can wake them a few milliseconds either side.
pub const TIMER_SLACK: f64 = 0.02;
