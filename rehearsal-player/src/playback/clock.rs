//! Playback clock anchoring
//!
//! While playing, the song position is derived, never accumulated:
//! `position = anchor_source_position + (now - anchor_clock_time) * speed`.
//! A new snapshot is captured on every (re)start, transition and speed change.

use serde::{Deserialize, Serialize};

/// Snapshot tying a host clock instant to a source position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackClock {
    /// Host clock time at which the anchor was taken (seconds)
    pub anchor_clock_time: f64,
    /// Source position playing at that instant (seconds)
    pub anchor_source_position: f64,
}

impl PlaybackClock {
    pub fn anchor(now: f64, source_position: f64) -> Self {
        Self {
            anchor_clock_time: now,
            anchor_source_position: source_position,
        }
    }

    /// Source position at host time `now`
    ///
    /// Clock readings before the anchor (host clock jitter) clamp to the anchor.
    pub fn position_at(&self, now: f64, speed: f64) -> f64 {
        let elapsed = (now - self.anchor_clock_time).max(0.0);
        self.anchor_source_position + elapsed * speed
    }

    /// Re-anchor at the current position so a speed change does not jump
    pub fn rebased(&self, now: f64, old_speed: f64) -> Self {
        Self::anchor(now, self.position_at(now, old_speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_advances_with_speed() {
        let clock = PlaybackClock::anchor(100.0, 30.0);
        assert_eq!(clock.position_at(100.0, 1.0), 30.0);
        assert_eq!(clock.position_at(105.0, 1.0), 35.0);
        assert_eq!(clock.position_at(105.0, 2.0), 40.0);
    }

    #[test]
    fn test_position_before_anchor_clamps() {
        let clock = PlaybackClock::anchor(100.0, 30.0);
        assert_eq!(clock.position_at(99.5, 1.0), 30.0);
    }

    #[test]
    fn test_rebase_preserves_position() {
        let clock = PlaybackClock::anchor(0.0, 10.0);
        let rebased = clock.rebased(4.0, 1.0);
        assert_eq!(rebased.anchor_source_position, 14.0);
        assert_eq!(rebased.position_at(4.0, 2.0), 14.0);
        assert_eq!(rebased.position_at(5.0, 2.0), 16.0);
    }
}
