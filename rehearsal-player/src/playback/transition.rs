//! Transition and play guards
//!
//! **TransitionSlot:** at most one skip/loop transition is in flight. Each
//! transition gets an id; its completion only applies if the slot still holds
//! that id, so a transition superseded by a seek cannot clobber the newer
//! state when its delayed completion finally runs.
//!
//! **PlayGuard:** scoped flag serializing `play()`. A second call while one is
//! in flight returns immediately. The flag clears on drop, including on
//! error paths.

use rehearsal_common::TransitionKind;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;

/// A transition waiting for its fade to finish
#[derive(Debug)]
pub struct ActiveTransition {
    pub id: u64,
    pub kind: TransitionKind,
    pub from: f64,
    pub target: f64,
    completion: Option<JoinHandle<()>>,
}

/// Transition-in-progress token holder
#[derive(Debug, Default)]
pub struct TransitionSlot {
    active: Option<ActiveTransition>,
    next_id: u64,
}

impl TransitionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveTransition> {
        self.active.as_ref()
    }

    /// Claim the slot; None when a transition is already running
    pub fn begin(&mut self, kind: TransitionKind, from: f64, target: f64) -> Option<u64> {
        if self.active.is_some() {
            return None;
        }
        self.next_id += 1;
        self.active = Some(ActiveTransition {
            id: self.next_id,
            kind,
            from,
            target,
            completion: None,
        });
        Some(self.next_id)
    }

    /// Attach the task that will complete transition `id`
    ///
    /// Aborts `handle` if the slot has moved on.
    pub fn attach_completion(&mut self, id: u64, handle: JoinHandle<()>) {
        match self.active.as_mut() {
            Some(active) if active.id == id => active.completion = Some(handle),
            _ => handle.abort(),
        }
    }

    /// Release the slot for transition `id`; None if it was superseded
    pub fn finish(&mut self, id: u64) -> Option<ActiveTransition> {
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            let mut active = self.active.take();
            if let Some(a) = active.as_mut() {
                // The caller is the completion task itself
                a.completion.take();
            }
            active
        } else {
            None
        }
    }

    /// Abandon the running transition, aborting its completion
    pub fn cancel(&mut self) -> Option<ActiveTransition> {
        let mut active = self.active.take()?;
        if let Some(handle) = active.completion.take() {
            handle.abort();
        }
        Some(active)
    }
}

/// Scoped claim on the play-in-progress flag
#[derive(Debug)]
pub struct PlayGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PlayGuard<'a> {
    /// Claim the flag; None when another `play()` holds it
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PlayGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
