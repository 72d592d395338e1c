//! Arrangement position model
//!
//! Classifies song positions against the arrangement's enabled/disabled
//! sections. Virtual (song) time and source time are numerically identical:
//! an arrangement disables ranges, it never reorders them, so "conversion"
//! is classification rather than remapping.
//!
//! **Design:**
//! - Sections are ordered and contiguous, covering `[0, duration)`
//! - Lookups are linear scans (arrangements hold a handful of sections)
//! - A position exactly on a boundary belongs to the section starting there
//! - The last section's end is inclusive, absorbing floating-point overshoot

use super::tolerance::BOUNDARY_EPSILON;
use crate::model::{ArrangementSection, Transport};

/// Read-only view over an ordered section list
#[derive(Debug, Clone, Copy)]
pub struct Arrangement<'a> {
    sections: &'a [ArrangementSection],
}

/// Where the loop jumps back to, once the arrangement is taken into account
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopTarget {
    /// Looping disabled or bounds unset
    Off,
    /// Loop configured but its (resolved) start is not before its end
    Invalid { end: f64 },
    /// Loop back from `end` to the enabled position `start`
    Valid { start: f64, end: f64 },
}

impl LoopTarget {
    /// Configured loop end, if any
    pub fn end(&self) -> Option<f64> {
        match self {
            LoopTarget::Off => None,
            LoopTarget::Invalid { end } | LoopTarget::Valid { end, .. } => Some(*end),
        }
    }

    /// Jump target when the loop is usable
    pub fn start(&self) -> Option<f64> {
        match self {
            LoopTarget::Valid { start, .. } => Some(*start),
            _ => None,
        }
    }
}

impl<'a> Arrangement<'a> {
    pub fn new(sections: &'a [ArrangementSection]) -> Self {
        Self { sections }
    }

    /// Index of the section containing `position`, or None if out of range
    pub fn section_index_at(&self, position: f64) -> Option<usize> {
        let last = self.sections.len().checked_sub(1)?;
        self.sections.iter().enumerate().position(|(i, s)| {
            position >= s.start && (position < s.end || (i == last && position <= s.end))
        })
    }

    /// Section containing `position`, or None if out of range
    pub fn section_at(&self, position: f64) -> Option<&'a ArrangementSection> {
        self.section_index_at(position).map(|i| &self.sections[i])
    }

    /// True when `position` lies inside a disabled section
    pub fn is_disabled_at(&self, position: f64) -> bool {
        self.section_at(position).is_some_and(|s| !s.enabled)
    }

    /// First enabled section starting strictly after `position`
    ///
    /// Never returns a disabled section, nor one starting at or before `position`.
    pub fn next_enabled_section_after(&self, position: f64) -> Option<&'a ArrangementSection> {
        self.sections
            .iter()
            .find(|s| s.enabled && s.start > position)
    }

    /// Enabled section containing `position`, else the next enabled one after it
    pub fn enabled_section_at_or_after(&self, position: f64) -> Option<&'a ArrangementSection> {
        match self.section_at(position) {
            Some(section) if section.enabled => Some(section),
            _ => self.next_enabled_section_after(position),
        }
    }

    /// Start of the first disabled section at or after `position`
    ///
    /// Returns `position` itself when it already lies in a disabled section.
    pub fn next_disabled_boundary(&self, position: f64) -> Option<f64> {
        if self.is_disabled_at(position) {
            return Some(position);
        }
        self.sections
            .iter()
            .find(|s| !s.enabled && s.start >= position)
            .map(|s| s.start)
    }

    /// End of the disabled run containing or starting at `boundary`
    pub fn disabled_run_end(&self, boundary: f64) -> Option<f64> {
        let start = self.section_index_at(boundary)?;
        self.sections[start..]
            .iter()
            .take_while(|s| !s.enabled)
            .last()
            .map(|s| s.end)
    }

    /// Where `play()` actually starts for a requested position
    ///
    /// Enabled positions start as-is; disabled positions resolve forward to
    /// the next enabled section's start; None when nothing enabled remains.
    pub fn resolve_play_start(&self, position: f64) -> Option<f64> {
        if self.sections.is_empty() {
            return Some(position);
        }
        match self.section_at(position) {
            Some(section) if section.enabled => Some(position),
            Some(_) => self.next_enabled_section_after(position).map(|s| s.start),
            None => self.enabled_section_at_or_after(position).map(|s| s.start.max(position)),
        }
    }

    /// Resolve the transport's loop against this arrangement
    ///
    /// A loop start inside a disabled section moves forward to the next
    /// enabled start; if that is not before the loop end, the loop is invalid.
    pub fn resolve_loop(&self, transport: &Transport) -> LoopTarget {
        let Some((start, end)) = transport.loop_bounds() else {
            return LoopTarget::Off;
        };

        let resolved_start = if self.is_disabled_at(start) {
            self.enabled_section_at_or_after(start).map(|s| s.start)
        } else {
            Some(start)
        };

        match resolved_start {
            Some(s) if s < end - BOUNDARY_EPSILON => LoopTarget::Valid { start: s, end },
            _ => LoopTarget::Invalid { end },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(layout: &[(f64, f64, bool)]) -> Vec<ArrangementSection> {
        layout.iter()
            .map(|&(start, end, enabled)| ArrangementSection::new(start, end, enabled))
            .collect()
    }

    fn looping(start: f64, end: f64) -> Transport {
        Transport {
            loop_enabled: true,
            loop_start: Some(start),
            loop_end: Some(end),
            ..Default::default()
        }
    }

    #[test]
    fn test_boundary_belongs_to_section_starting_there() {
        let s = sections(&[(0.0, 10.0, true), (10.0, 20.0, false)]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.section_index_at(10.0), Some(1));
        assert_eq!(arr.section_index_at(9.999), Some(0));
    }

    #[test]
    fn test_last_section_end_is_inclusive() {
        let s = sections(&[(0.0, 10.0, true), (10.0, 20.0, true)]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.section_index_at(20.0), Some(1));
        assert_eq!(arr.section_index_at(20.001), None);
        assert_eq!(arr.section_index_at(-0.5), None);
    }

    #[test]
    fn test_next_enabled_after_skips_disabled() {
        let s = sections(&[
            (0.0, 10.0, true),
            (10.0, 15.0, false),
            (15.0, 18.0, false),
            (18.0, 30.0, true),
        ]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.next_enabled_section_after(5.0).unwrap().start, 18.0);
        assert_eq!(arr.next_enabled_section_after(12.0).unwrap().start, 18.0);
        assert!(arr.next_enabled_section_after(18.0).is_none());
    }

    #[test]
    fn test_next_enabled_after_never_returns_section_at_or_before_position() {
        let s = sections(&[
            (0.0, 5.0, false),
            (5.0, 10.0, true),
            (10.0, 12.0, false),
            (12.0, 20.0, true),
            (20.0, 25.0, false),
        ]);
        let arr = Arrangement::new(&s);
        let mut pos = 0.0;
        while pos <= 25.0 {
            if let Some(section) = arr.next_enabled_section_after(pos) {
                assert!(section.enabled);
                assert!(section.start > pos, "pos {} returned start {}", pos, section.start);
            }
            pos += 0.25;
        }
    }

    #[test]
    fn test_enabled_section_at_or_after_includes_current() {
        let s = sections(&[(0.0, 10.0, true), (10.0, 20.0, false), (20.0, 30.0, true)]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.enabled_section_at_or_after(5.0).unwrap().start, 0.0);
        assert_eq!(arr.enabled_section_at_or_after(12.0).unwrap().start, 20.0);
        assert_eq!(arr.enabled_section_at_or_after(20.0).unwrap().start, 20.0);
    }

    #[test]
    fn test_resolve_play_start() {
        let s = sections(&[(0.0, 10.0, true), (10.0, 20.0, false), (20.0, 30.0, true)]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.resolve_play_start(4.0), Some(4.0));
        assert_eq!(arr.resolve_play_start(12.0), Some(20.0));
    }

    #[test]
    fn test_resolve_play_start_none_when_nothing_enabled_ahead() {
        let s = sections(&[(0.0, 10.0, true), (10.0, 30.0, false)]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.resolve_play_start(15.0), None);
    }

    #[test]
    fn test_next_disabled_boundary() {
        let s = sections(&[(0.0, 10.0, true), (10.0, 20.0, true), (20.0, 25.0, false)]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.next_disabled_boundary(3.0), Some(20.0));
        assert_eq!(arr.next_disabled_boundary(22.0), Some(22.0));
    }

    #[test]
    fn test_disabled_run_end_spans_consecutive_sections() {
        let s = sections(&[
            (0.0, 10.0, true),
            (10.0, 12.0, false),
            (12.0, 15.0, false),
            (15.0, 20.0, true),
        ]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.disabled_run_end(10.0), Some(15.0));
        assert_eq!(arr.disabled_run_end(13.0), Some(15.0));
        assert_eq!(arr.disabled_run_end(5.0), None);
    }

    #[test]
    fn test_resolve_loop_plain() {
        let s = sections(&[(0.0, 30.0, true)]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.resolve_loop(&looping(10.0, 20.0)), LoopTarget::Valid { start: 10.0, end: 20.0 });
        assert_eq!(arr.resolve_loop(&Transport::default()), LoopTarget::Off);
    }

    #[test]
    fn test_resolve_loop_start_in_disabled_section_moves_forward() {
        let s = sections(&[(0.0, 8.0, true), (8.0, 12.0, false), (12.0, 30.0, true)]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.resolve_loop(&looping(9.0, 20.0)), LoopTarget::Valid { start: 12.0, end: 20.0 });
    }

    #[test]
    fn test_resolve_loop_invalid_when_resolved_start_not_before_end() {
        let s = sections(&[(0.0, 8.0, true), (8.0, 22.0, false), (22.0, 30.0, true)]);
        let arr = Arrangement::new(&s);
        assert_eq!(arr.resolve_loop(&looping(9.0, 20.0)), LoopTarget::Invalid { end: 20.0 });
    }
}
