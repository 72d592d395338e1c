//! Core playback engine - construction, shared state and control loop
//!
//! **Responsibilities:**
//! - PlaybackEngine struct definition and initialization
//! - The control task: every frame tick, timer expiry, fade completion and
//!   host callback is marshalled onto one task and handled in order
//! - Shared helpers (position derivation, teardown, event emission)
//!
//! **Concurrency:** all engine state lives in `EngineCore` behind a single
//! async mutex. Poller, timer and fade tasks never touch it; they only sleep
//! and post `ControlEvent`s, so aborting them cannot interrupt engine work.

use crate::config::EngineConfig;
use crate::model::Song;
use crate::playback::arrangement::Arrangement;
use crate::playback::audibility::AudibilityTracker;
use crate::playback::chain::MashupChain;
use crate::playback::clock::PlaybackClock;
use crate::playback::decision::{next_event, DecisionContext, EventKind, NextEvent};
use crate::playback::graph::{AudioGraph, GraphEvent};
use crate::playback::routing::PlaybackGraph;
use crate::playback::scheduler::Scheduler;
use crate::playback::transition::TransitionSlot;
use rehearsal_common::{EventBus, PlaybackState, RehearsalEvent};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Work posted to the control task
#[derive(Debug, Clone, Copy)]
pub(super) enum ControlEvent {
    /// Predictive timer expired
    TimerFired { kind: EventKind, generation: u64 },
    /// Fade of transition `id` finished
    TransitionDue { id: u64 },
}

/// Mutable engine state, guarded by `EngineInner::core`
pub(super) struct EngineCore {
    pub(super) song: Option<Song>,
    pub(super) graph: PlaybackGraph,
    pub(super) state: PlaybackState,
    pub(super) clock: PlaybackClock,
    pub(super) visible: bool,
    pub(super) scheduler: Scheduler,
    pub(super) transition: TransitionSlot,
    pub(super) audibility: AudibilityTracker,
    /// Chain took over; no polling or scheduling until the next load
    pub(super) awaiting_handoff: bool,
    /// Host time of the last throttled PositionChanged
    pub(super) last_position_event: f64,
}

impl EngineCore {
    /// Song position now: derived from the clock while playing
    pub(super) fn current_position(&self, now: f64) -> f64 {
        let Some(song) = self.song.as_ref() else {
            return 0.0;
        };
        if self.state == PlaybackState::Playing {
            self.clock.position_at(now, song.transport.speed)
        } else {
            song.transport.position
        }
    }

    pub(super) fn song_id(&self) -> Option<Uuid> {
        self.song.as_ref().map(|s| s.id)
    }

    /// Whether frame/timer driven checks should run
    pub(super) fn is_steady_playing(&self) -> bool {
        self.state == PlaybackState::Playing
            && !self.transition.is_active()
            && !self.awaiting_handoff
    }

    /// Next skip/loop/end event from `position`
    pub(super) fn next_event_at(&self, position: f64, lookahead: f64) -> NextEvent {
        let Some(song) = self.song.as_ref() else {
            return NextEvent::None;
        };
        let arrangement = Arrangement::new(&song.arrangement);
        next_event(&DecisionContext {
            position,
            arrangement,
            loop_target: arrangement.resolve_loop(&song.transport),
            content_end: song.duration(),
            lookahead,
        })
    }
}

pub(super) struct EngineInner {
    pub(super) config: EngineConfig,
    pub(super) host: Arc<dyn AudioGraph>,
    pub(super) chain: Arc<dyn MashupChain>,
    pub(super) events: EventBus,
    pub(super) play_in_progress: AtomicBool,
    pub(super) core: Mutex<EngineCore>,
    pub(super) control_tx: mpsc::UnboundedSender<ControlEvent>,
    /// Coalesced frame ticks from the poller
    pub(super) frame: Arc<Notify>,
    control_task: JoinHandle<()>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.control_task.abort();
    }
}

/// Playback engine - owned, constructor-injected instance
///
/// Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct PlaybackEngine {
    pub(super) inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    /// Create an engine driving `host`, consulting `chain` when a song runs out
    ///
    /// Must be called within a tokio runtime: the control task is spawned here.
    pub fn new(
        config: EngineConfig,
        host: Arc<dyn AudioGraph>,
        chain: Arc<dyn MashupChain>,
        events: EventBus,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (graph_tx, graph_rx) = mpsc::unbounded_channel();
        host.set_event_sink(graph_tx);
        let frame = Arc::new(Notify::new());

        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let control_task = tokio::spawn(run_control_loop(
                weak.clone(),
                control_rx,
                graph_rx,
                Arc::clone(&frame),
            ));
            EngineInner {
                core: Mutex::new(EngineCore {
                    song: None,
                    graph: PlaybackGraph::new(Arc::clone(&host)),
                    state: PlaybackState::Stopped,
                    clock: PlaybackClock::default(),
                    visible: true,
                    scheduler: Scheduler::new(),
                    transition: TransitionSlot::new(),
                    audibility: AudibilityTracker::new(),
                    awaiting_handoff: false,
                    last_position_event: 0.0,
                }),
                config,
                host,
                chain,
                events,
                play_in_progress: AtomicBool::new(false),
                control_tx,
                frame,
                control_task,
            }
        });

        info!("Playback engine created");
        Self { inner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub(super) fn weak(&self) -> Weak<EngineInner> {
        Arc::downgrade(&self.inner)
    }

    pub(super) fn now(&self) -> f64 {
        self.inner.host.current_time()
    }

    pub(super) fn emit(&self, event: RehearsalEvent) {
        self.inner.events.emit_lossy(event);
    }

    /// Record a new transport state and announce it
    pub(super) fn set_state(&self, core: &mut EngineCore, new_state: PlaybackState) {
        let old_state = core.state;
        if old_state == new_state {
            return;
        }
        core.state = new_state;
        let Some(song) = core.song.as_ref() else {
            return;
        };
        info!(
            "Playback state {} -> {} at {}",
            old_state,
            new_state,
            rehearsal_common::human_time::format_position(song.transport.position)
        );
        self.emit(RehearsalEvent::PlaybackStateChanged {
            song_id: song.id,
            old_state,
            new_state,
            position: song.transport.position,
            timestamp: rehearsal_common::time::now(),
        });
    }

    pub(super) fn emit_position(&self, core: &mut EngineCore, position: f64) {
        if let Some(song_id) = core.song_id() {
            core.last_position_event = self.now();
            self.emit(RehearsalEvent::PositionChanged {
                song_id,
                position,
                timestamp: rehearsal_common::time::now(),
            });
        }
    }

    /// Stop everything that produces sound or pending work
    ///
    /// Transition, timers and poller are cancelled; sources stop immediately;
    /// audibility tracking is cleared so it is recomputed on the next start.
    pub(super) fn teardown(&self, core: &mut EngineCore) {
        if let Some(active) = core.transition.cancel() {
            debug!("Cancelled in-flight {} transition {}", active.kind, active.id);
        }
        core.scheduler.cancel_all();
        core.graph.stop_sources();
        core.audibility.clear();
        core.awaiting_handoff = false;
    }

    async fn handle_control(&self, event: ControlEvent) {
        match event {
            ControlEvent::TimerFired { kind, generation } => self.on_timer(kind, generation).await,
            ControlEvent::TransitionDue { id } => self.complete_transition(id).await,
        }
    }
}

/// Control task: serializes every asynchronous trigger onto the engine
async fn run_control_loop(
    weak: Weak<EngineInner>,
    mut control_rx: mpsc::UnboundedReceiver<ControlEvent>,
    mut graph_rx: mpsc::UnboundedReceiver<GraphEvent>,
    frame: Arc<Notify>,
) {
    loop {
        enum Work {
            Control(ControlEvent),
            Graph(GraphEvent),
            Frame,
        }

        let work = tokio::select! {
            Some(event) = control_rx.recv() => Work::Control(event),
            Some(event) = graph_rx.recv() => Work::Graph(event),
            _ = frame.notified() => Work::Frame,
        };

        let Some(inner) = weak.upgrade() else {
            break;
        };
        let engine = PlaybackEngine { inner };
        match work {
            Work::Control(event) => engine.handle_control(event).await,
            Work::Graph(GraphEvent::SourceEnded { source }) => {
                engine.notify_source_ended(source).await
            }
            Work::Frame => engine.on_frame().await,
        }
    }
    debug!("Engine control loop exited");
}
