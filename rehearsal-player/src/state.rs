//! Shared service state
//!
//! State the HTTP layer needs beyond the engine itself: the event bus SSE
//! clients subscribe to, and service bookkeeping for the health endpoint.

use chrono::{DateTime, Utc};
use rehearsal_common::{EventBus, RehearsalEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// Shared state accessible by all handlers
pub struct SharedState {
    /// Event broadcaster for SSE events (shared with the engine)
    pub events: EventBus,

    /// Service start time
    pub started_at: DateTime<Utc>,

    /// Currently connected SSE clients
    sse_clients: AtomicUsize,
}

impl SharedState {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            started_at: rehearsal_common::time::now(),
            sse_clients: AtomicUsize::new(0),
        }
    }

    /// Subscribe to engine events
    pub fn subscribe_events(&self) -> broadcast::Receiver<RehearsalEvent> {
        self.events.subscribe()
    }

    pub fn sse_client_connected(&self) -> usize {
        self.sse_clients.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn sse_client_disconnected(&self) -> usize {
        self.sse_clients
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1)
    }

    pub fn sse_client_count(&self) -> usize {
        self.sse_clients.load(Ordering::Relaxed)
    }

    /// Seconds since the service started
    pub fn uptime_secs(&self) -> i64 {
        (rehearsal_common::time::now() - self.started_at).num_seconds()
    }
}
