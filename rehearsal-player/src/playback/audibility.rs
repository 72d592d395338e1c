//! Mute/audibility engine
//!
//! A track is audible when no track is soloed (or it is soloed itself), it
//! is not muted, and its mute sections do not silence the current source
//! position. State changes are applied as short exponential gain ramps; the
//! last applied state is tracked per track so a frame that changes nothing
//! issues no ramps.

use crate::model::{MuteSection, Song, Track};
use std::collections::HashMap;
use uuid::Uuid;

/// Whether the mute section containing `source_position` is muted
///
/// Out-of-range positions are never muted. The last section's end is inclusive.
pub fn is_time_muted(sections: &[MuteSection], source_position: f64) -> bool {
    let last = sections.len().saturating_sub(1);
    sections
        .iter()
        .enumerate()
        .find(|(i, s)| {
            source_position >= s.start
                && (source_position < s.end || (*i == last && source_position <= s.end))
        })
        .is_some_and(|(_, s)| s.muted)
}

/// Next position after `source_position` where the muted state flips
pub fn next_mute_boundary(sections: &[MuteSection], source_position: f64) -> Option<f64> {
    let current = is_time_muted(sections, source_position);
    sections
        .iter()
        .find(|s| s.start > source_position && s.muted != current)
        .map(|s| s.start)
        .or_else(|| {
            // Leaving a muted tail into silence-free space past the last section
            sections
                .last()
                .filter(|s| current && s.end > source_position)
                .map(|s| s.end)
        })
}

/// Audibility of `track` at `source_position`
pub fn is_audible(track: &Track, any_solo: bool, source_position: f64) -> bool {
    (!any_solo || track.solo)
        && !track.muted
        && !is_time_muted(&track.mute_sections, source_position)
}

/// Gain a track should sit at for a given audibility
pub fn target_gain(track: &Track, audible: bool) -> f32 {
    if audible {
        track.volume
    } else {
        0.0
    }
}

/// Earliest mute boundary of any track after `source_position`
pub fn next_song_mute_boundary(song: &Song, source_position: f64) -> Option<f64> {
    song.tracks
        .iter()
        .filter_map(|t| next_mute_boundary(&t.mute_sections, source_position))
        .min_by(f64::total_cmp)
}

/// One detected change of audibility
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudibilityChange {
    pub track_id: Uuid,
    pub audible: bool,
    pub target_gain: f32,
}

/// Last applied audibility per track
#[derive(Debug, Default)]
pub struct AudibilityTracker {
    applied: HashMap<Uuid, bool>,
}

impl AudibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; the next evaluation reports every track
    pub fn clear(&mut self) {
        self.applied.clear();
    }

    pub fn forget(&mut self, track_id: Uuid) {
        self.applied.remove(&track_id);
    }

    pub fn last_applied(&self, track_id: Uuid) -> Option<bool> {
        self.applied.get(&track_id).copied()
    }

    pub fn record(&mut self, track_id: Uuid, audible: bool) {
        self.applied.insert(track_id, audible);
    }

    /// Current audibility of every track, recorded as applied
    pub fn reset_to(&mut self, song: &Song, source_position: f64) -> Vec<AudibilityChange> {
        self.clear();
        let any_solo = song.any_solo();
        song.tracks
            .iter()
            .map(|track| {
                let audible = is_audible(track, any_solo, source_position);
                self.applied.insert(track.id, audible);
                AudibilityChange {
                    track_id: track.id,
                    audible,
                    target_gain: target_gain(track, audible),
                }
            })
            .collect()
    }

    /// Tracks whose audibility differs from what was last applied
    ///
    /// Reported changes are recorded as applied.
    pub fn evaluate(&mut self, song: &Song, source_position: f64) -> Vec<AudibilityChange> {
        let any_solo = song.any_solo();
        let mut changes = Vec::new();
        for track in &song.tracks {
            let audible = is_audible(track, any_solo, source_position);
            if self.applied.get(&track.id) == Some(&audible) {
                continue;
            }
            self.applied.insert(track.id, audible);
            changes.push(AudibilityChange {
                track_id: track.id,
                audible,
                target_gain: target_gain(track, audible),
            });
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DecodedAudio;

    fn mutes(layout: &[(f64, f64, bool)]) -> Vec<MuteSection> {
        layout.iter()
            .map(|&(start, end, muted)| MuteSection::new(start, end, muted))
            .collect()
    }

    fn song(n: usize) -> Song {
        let tracks = (0..n)
            .map(|i| Track::new(format!("t{}", i), DecodedAudio::new(60.0)))
            .collect();
        Song::new("Song", tracks)
    }

    #[test]
    fn test_time_mute_lookup() {
        let sections = mutes(&[(0.0, 10.0, false), (10.0, 20.0, true), (20.0, 30.0, false)]);
        assert!(!is_time_muted(&sections, 9.99));
        assert!(is_time_muted(&sections, 10.0));
        assert!(!is_time_muted(&sections, 20.0));
        assert!(!is_time_muted(&sections, 45.0));
        assert!(!is_time_muted(&[], 5.0));
    }

    #[test]
    fn test_next_mute_boundary() {
        let sections = mutes(&[(0.0, 10.0, false), (10.0, 20.0, true), (20.0, 30.0, false)]);
        assert_eq!(next_mute_boundary(&sections, 5.0), Some(10.0));
        assert_eq!(next_mute_boundary(&sections, 12.0), Some(20.0));
        assert_eq!(next_mute_boundary(&sections, 25.0), None);

        let tail = mutes(&[(0.0, 10.0, false), (10.0, 30.0, true)]);
        assert_eq!(next_mute_boundary(&tail, 15.0), Some(30.0));
    }

    #[test]
    fn test_muted_and_solo_silenced_tracks_are_inaudible() {
        let mut song = song(3);
        song.tracks[0].muted = true;
        song.tracks[1].solo = true;
        let any_solo = song.any_solo();

        assert!(!is_audible(&song.tracks[0], any_solo, 0.0));
        assert!(is_audible(&song.tracks[1], any_solo, 0.0));
        assert!(!is_audible(&song.tracks[2], any_solo, 0.0));
    }

    #[test]
    fn test_without_solo_only_mutes_matter() {
        let mut song = song(2);
        song.tracks[1].mute_sections = mutes(&[(0.0, 5.0, true), (5.0, 60.0, false)]);
        let any_solo = song.any_solo();

        assert!(is_audible(&song.tracks[0], any_solo, 2.0));
        assert!(!is_audible(&song.tracks[1], any_solo, 2.0));
        assert!(is_audible(&song.tracks[1], any_solo, 6.0));
    }

    #[test]
    fn test_tracker_reports_only_changes() {
        let mut song = song(2);
        song.tracks[1].mute_sections = mutes(&[(0.0, 5.0, false), (5.0, 60.0, true)]);
        let mut tracker = AudibilityTracker::new();

        assert_eq!(tracker.reset_to(&song, 0.0).len(), 2);
        assert!(tracker.evaluate(&song, 1.0).is_empty());

        let changes = tracker.evaluate(&song, 5.0);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].track_id, song.tracks[1].id);
        assert!(!changes[0].audible);
        assert_eq!(changes[0].target_gain, 0.0);

        assert!(tracker.evaluate(&song, 6.0).is_empty());
    }

    #[test]
    fn test_cleared_tracker_reports_everything() {
        let song = song(2);
        let mut tracker = AudibilityTracker::new();
        tracker.reset_to(&song, 0.0);
        tracker.clear();
        assert_eq!(tracker.last_applied(song.tracks[0].id), None);
        assert_eq!(tracker.evaluate(&song, 0.0).len(), 2);
    }

    #[test]
    fn test_target_gain_uses_volume() {
        let mut track = Track::new("t", DecodedAudio::new(1.0));
        track.volume = 0.4;
        assert_eq!(target_gain(&track, true), 0.4);
        assert_eq!(target_gain(&track, false), 0.0);
    }
}
