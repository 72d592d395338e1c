//! Skip/loop/end decision logic
//!
//! One authoritative computation of "what happens next" from a song
//! position. The frame poller asks whether the result is already due; the
//! predictive scheduler converts it into a timer delay. Both triggers go
//! through `next_event`, so they cannot disagree about the outcome.
//!
//! **Rules:**
//! - Entering (or approaching within the lookahead) a disabled section skips
//!   to the next enabled section start
//! - Loop takes precedence over skip when the loop end lies within
//!   `[position, skip target)`, which includes the disabled run itself, and
//!   whenever the disabled run opens inside the loop region
//!
//!   The second case trades reach for predictability: with a loop over
//!   `[10, 30)` and `[15, 18)` disabled, playback from 10 loops back at 15,
//!   so `[18, 30)` is only heard after seeking into it. A disabled run ends
//!   the looped material rather than being jumped over.
//! - A loop triggers at `loop_end` and up to `LOOP_END_TOLERANCE` past it;
//!   positions further past were reached deliberately and do not loop
//! - No enabled content ahead and no usable loop: advance the chain or stop
//! - Earliest event wins; ties favour the loop

use super::arrangement::{Arrangement, LoopTarget};
use super::tolerance::{BOUNDARY_EPSILON, END_OF_CONTENT_EPSILON, LOOP_END_TOLERANCE};
use serde::Serialize;

/// Scheduler slot an event occupies; at most one timer per kind is armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Skip,
    Loop,
    End,
    MuteBoundary,
}

/// Next transport event from a given position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NextEvent {
    /// Jump over a disabled run starting at `at`
    ///
    /// `target` is None when no enabled section remains: advance or stop.
    Skip {
        at: f64,
        target: Option<f64>,
        lead: f64,
    },
    /// Jump back to the resolved loop start
    Loop { at: f64, target: f64, lead: f64 },
    /// No further playable content at `at`: advance or stop
    End { at: f64 },
    /// Nothing scheduled ahead
    None,
}

impl NextEvent {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            NextEvent::Skip { .. } => Some(EventKind::Skip),
            NextEvent::Loop { .. } => Some(EventKind::Loop),
            NextEvent::End { .. } => Some(EventKind::End),
            NextEvent::None => None,
        }
    }

    /// Position at which the event becomes due (its boundary minus any lead)
    pub fn trigger_position(&self) -> Option<f64> {
        match *self {
            NextEvent::Skip { at, lead, .. } | NextEvent::Loop { at, lead, .. } => Some(at - lead),
            NextEvent::End { at } => Some(at - END_OF_CONTENT_EPSILON),
            NextEvent::None => None,
        }
    }

    /// Position the event occurs at
    pub fn at(&self) -> Option<f64> {
        match *self {
            NextEvent::Skip { at, .. } | NextEvent::Loop { at, .. } | NextEvent::End { at } => {
                Some(at)
            }
            NextEvent::None => None,
        }
    }

    /// Whether the event must run now, allowing `slack` for early timer wake-ups
    pub fn is_due(&self, position: f64, slack: f64) -> bool {
        match self.trigger_position() {
            Some(trigger) => position >= trigger - slack - BOUNDARY_EPSILON,
            None => false,
        }
    }

    /// Precedence when two events share a position: loop, then skip, then end
    fn tie_rank(&self) -> u8 {
        match self {
            NextEvent::Loop { .. } => 0,
            NextEvent::Skip { .. } => 1,
            NextEvent::End { .. } => 2,
            NextEvent::None => 3,
        }
    }
}

/// Inputs to the next-event computation
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    /// Current song position
    pub position: f64,
    pub arrangement: Arrangement<'a>,
    pub loop_target: LoopTarget,
    /// End of the longest track
    pub content_end: f64,
    /// How early (song seconds) a skip into a disabled section begins
    pub lookahead: f64,
}

/// Compute the next skip/loop/end event from `ctx.position`
pub fn next_event(ctx: &DecisionContext<'_>) -> NextEvent {
    let candidates = [
        loop_end_candidate(ctx),
        disabled_section_candidate(ctx),
        end_of_content_candidate(ctx),
    ];

    candidates
        .into_iter()
        .flatten()
        .min_by(|a, b| {
            let (a_at, b_at) = (a.at().unwrap_or(f64::INFINITY), b.at().unwrap_or(f64::INFINITY));
            if (a_at - b_at).abs() <= BOUNDARY_EPSILON {
                a.tie_rank().cmp(&b.tie_rank())
            } else {
                a_at.total_cmp(&b_at)
            }
        })
        .unwrap_or(NextEvent::None)
}

/// Arrival at the configured loop end
fn loop_end_candidate(ctx: &DecisionContext<'_>) -> Option<NextEvent> {
    match ctx.loop_target {
        LoopTarget::Valid { start, end } if ctx.position <= end + LOOP_END_TOLERANCE => {
            Some(NextEvent::Loop {
                at: end,
                target: start,
                lead: 0.0,
            })
        }
        // The loop would be taken but has nowhere to go
        LoopTarget::Invalid { end } if ctx.position <= end + LOOP_END_TOLERANCE => {
            Some(NextEvent::Skip {
                at: end,
                target: None,
                lead: 0.0,
            })
        }
        _ => None,
    }
}

/// Entering or approaching a disabled run, with loop precedence applied
fn disabled_section_candidate(ctx: &DecisionContext<'_>) -> Option<NextEvent> {
    let arrangement = ctx.arrangement;
    let boundary = arrangement.next_disabled_boundary(ctx.position)?;
    let target = arrangement
        .next_enabled_section_after(boundary)
        .map(|s| s.start);
    let lead = if boundary > ctx.position { ctx.lookahead } else { 0.0 };

    let loop_end_in_skipped_span = ctx.loop_target.end().is_some_and(|end| {
        end >= ctx.position - BOUNDARY_EPSILON && end < target.unwrap_or(f64::INFINITY)
    });
    // A disabled run opening inside the loop region cuts the loop short
    let run_inside_loop = matches!(
        ctx.loop_target,
        LoopTarget::Valid { start, end }
            if boundary >= start - BOUNDARY_EPSILON && boundary < end - BOUNDARY_EPSILON
    );

    if loop_end_in_skipped_span || run_inside_loop {
        return match ctx.loop_target {
            // The plain loop-end candidate fires first
            LoopTarget::Valid { end, .. } if end < boundary => None,
            LoopTarget::Valid { start, .. } => Some(NextEvent::Loop {
                at: boundary,
                target: start,
                lead,
            }),
            _ => Some(NextEvent::Skip {
                at: boundary,
                target: None,
                lead,
            }),
        };
    }

    match (target, ctx.loop_target) {
        (Some(target), _) => Some(NextEvent::Skip {
            at: boundary,
            target: Some(target),
            lead,
        }),
        // Arrangement exhausted: a usable loop still takes us back
        (None, LoopTarget::Valid { start, .. }) => Some(NextEvent::Loop {
            at: boundary,
            target: start,
            lead,
        }),
        (None, _) => Some(NextEvent::Skip {
            at: boundary,
            target: None,
            lead,
        }),
    }
}

/// Running off the end of the longest track
fn end_of_content_candidate(ctx: &DecisionContext<'_>) -> Option<NextEvent> {
    if ctx.content_end <= 0.0 {
        return None;
    }
    Some(match ctx.loop_target {
        LoopTarget::Valid { start, .. } => NextEvent::Loop {
            at: ctx.content_end,
            target: start,
            lead: END_OF_CONTENT_EPSILON,
        },
        _ => NextEvent::End {
            at: ctx.content_end,
        },
    })
}
