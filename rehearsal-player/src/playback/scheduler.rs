//! Dual scheduler bookkeeping
//!
//! **Frame poller:** a repeating task active while the engine is visible and
//! playing. It re-evaluates position every frame.
//!
//! **Predictive timers:** one delay timer per `EventKind`, armed from the
//! next-event computation so behaviour survives without frame callbacks.
//! Timers carry the generation they were armed in; cancelling bumps the
//! generation, so a timer that fires after being superseded is ignored even
//! if its abort raced the wake-up.
//!
//! Cancellation is all-or-nothing: `cancel_timers` drops every slot.

use super::decision::EventKind;
use rehearsal_common::time::secs_to_duration;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    /// Song position the timer was armed for
    trigger_position: f64,
    handle: JoinHandle<()>,
}

/// Timer slots plus the frame poller handle
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<EventKind, ArmedTimer>,
    poller: Option<JoinHandle<()>>,
    generation: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation new timers must be armed with
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Store a timer, replacing (and aborting) any timer of the same kind
    pub fn arm(&mut self, kind: EventKind, trigger_position: f64, handle: JoinHandle<()>) {
        let armed = ArmedTimer {
            generation: self.generation,
            trigger_position,
            handle,
        };
        if let Some(old) = self.timers.insert(kind, armed) {
            old.handle.abort();
        }
    }

    /// Claim a fired timer; false if it was cancelled or superseded
    pub fn take_fired(&mut self, kind: EventKind, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        match self.timers.get(&kind) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(&kind);
                true
            }
            _ => false,
        }
    }

    /// Abort every armed timer and invalidate any already in flight
    pub fn cancel_timers(&mut self) {
        self.generation += 1;
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    pub fn is_armed(&self, kind: EventKind) -> bool {
        self.timers.contains_key(&kind)
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    /// Trigger position of the armed timer of `kind`
    pub fn armed_position(&self, kind: EventKind) -> Option<f64> {
        self.timers.get(&kind).map(|t| t.trigger_position)
    }

    pub fn set_poller(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.poller.replace(handle) {
            old.abort();
        }
    }

    pub fn stop_poller(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }

    pub fn poller_running(&self) -> bool {
        self.poller.is_some()
    }

    /// Stop the poller and every timer
    pub fn cancel_all(&mut self) {
        self.stop_poller();
        self.cancel_timers();
    }
}

/// Wall-clock delay until `trigger_position` at `speed`, capped at `max`
pub fn timer_delay(trigger_position: f64, position: f64, speed: f64, max: Duration) -> Duration {
    let virtual_secs = (trigger_position - position).max(0.0);
    secs_to_duration(virtual_secs / speed).min(max)
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
