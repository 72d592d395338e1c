//! In-memory graph host
//!
//! **Purpose:** an `AudioGraph` that renders nothing but tracks everything the
//! engine asks of it: node topology, gain automation, pitch unit controls and
//! source progress. The headless service runs on it, and tests inspect it.
//!
//! **Clock:** seconds elapsed since construction on the tokio clock, so a
//! paused test runtime advances audio time, timers and frame ticks together.
//!
//! **Natural end:** every started source spawns a task that sleeps until the
//! buffer is exhausted (at the current playback rate) and then raises
//! `GraphEvent::SourceEnded`. Stopping a source or changing its rate replaces
//! that task.

use super::graph::{AudioGraph, GraphEvent, NodeId, PitchParams, SourceId};
use crate::error::{Error, Result};
use crate::model::DecodedAudio;
use rehearsal_common::ramp::GainRamp;
use rehearsal_common::time::secs_to_duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Node flavours the host knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Master,
    Gain,
    Pan,
    PitchUnit,
}

/// Gain parameter with at most one pending exponential ramp
#[derive(Debug, Clone, Copy)]
struct GainParam {
    value: f32,
    ramp: Option<GainRamp>,
}

impl GainParam {
    fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    fn value_at(&self, now: f64) -> f32 {
        match self.ramp {
            Some(ramp) if now >= ramp.start_time => ramp.value_at(now),
            _ => self.value,
        }
    }

    /// Collapse the pending ramp into a plain value
    fn hold(&mut self, now: f64) {
        self.value = self.value_at(now);
        self.ramp = None;
    }
}

#[derive(Debug)]
struct NodeState {
    kind: NodeKind,
    gain: GainParam,
    pan: f32,
    pitch: PitchParams,
    outputs: Vec<NodeId>,
}

impl NodeState {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            gain: GainParam::new(1.0),
            pan: 0.0,
            pitch: PitchParams::default(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct SourceState {
    audio: DecodedAudio,
    destination: NodeId,
    /// Buffer offset at `anchor_time`
    anchor_offset: f64,
    anchor_time: f64,
    playback_rate: f64,
    end_task: Option<JoinHandle<()>>,
}

impl SourceState {
    fn offset_at(&self, now: f64) -> f64 {
        let offset = self.anchor_offset + (now - self.anchor_time).max(0.0) * self.playback_rate;
        offset.min(self.audio.duration)
    }

    fn remaining_wall_secs(&self, now: f64) -> f64 {
        (self.audio.duration - self.offset_at(now)).max(0.0) / self.playback_rate
    }
}

impl Drop for SourceState {
    fn drop(&mut self) {
        if let Some(task) = self.end_task.take() {
            task.abort();
        }
    }
}

/// Snapshot of a live source, for inspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub id: SourceId,
    pub buffer_duration: f64,
    pub destination: NodeId,
    /// Buffer offset the source has reached
    pub offset: f64,
    pub playback_rate: f64,
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<NodeId, NodeState>,
    sources: HashMap<SourceId, SourceState>,
    sources_started: u64,
}

struct VirtualGraphInner {
    origin: Instant,
    master: NodeId,
    next_id: AtomicU64,
    state: Mutex<GraphState>,
    sink: Mutex<Option<mpsc::UnboundedSender<GraphEvent>>>,
    fail_node_creation: AtomicBool,
    fail_gain_ramps: AtomicBool,
}

impl VirtualGraphInner {
    fn state(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn notify(&self, event: GraphEvent) {
        let sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = sink.as_ref() {
            // Receiver gone means the engine shut down
            let _ = sink.send(event);
        }
    }
}

/// In-memory `AudioGraph` host (cheap to clone; clones share state)
#[derive(Clone)]
pub struct VirtualGraph {
    inner: Arc<VirtualGraphInner>,
}

impl Default for VirtualGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualGraph {
    pub fn new() -> Self {
        let master = NodeId(0);
        let mut state = GraphState::default();
        state.nodes.insert(master, NodeState::new(NodeKind::Master));
        Self {
            inner: Arc::new(VirtualGraphInner {
                origin: Instant::now(),
                master,
                next_id: AtomicU64::new(1),
                state: Mutex::new(state),
                sink: Mutex::new(None),
                fail_node_creation: AtomicBool::new(false),
                fail_gain_ramps: AtomicBool::new(false),
            }),
        }
    }

    /// Make subsequent node creation fail (host failure injection)
    pub fn set_fail_node_creation(&self, fail: bool) {
        self.inner.fail_node_creation.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent gain ramps fail
    pub fn set_fail_gain_ramps(&self, fail: bool) {
        self.inner.fail_gain_ramps.store(fail, Ordering::SeqCst);
    }

    /// Current gain of a node, ramps included
    pub fn gain(&self, node: NodeId) -> Option<f32> {
        let now = self.inner.now();
        self.inner.state().nodes.get(&node).map(|n| n.gain.value_at(now))
    }

    /// Value the node's gain is heading for
    pub fn gain_target(&self, node: NodeId) -> Option<f32> {
        self.inner
            .state()
            .nodes
            .get(&node)
            .map(|n| n.gain.ramp.map_or(n.gain.value, |r| r.target))
    }

    pub fn gain_ramp(&self, node: NodeId) -> Option<GainRamp> {
        self.inner.state().nodes.get(&node).and_then(|n| n.gain.ramp)
    }

    pub fn pan(&self, node: NodeId) -> Option<f32> {
        self.inner.state().nodes.get(&node).map(|n| n.pan)
    }

    pub fn pitch_params(&self, node: NodeId) -> Option<PitchParams> {
        self.inner.state().nodes.get(&node).map(|n| n.pitch)
    }

    pub fn outputs(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .state()
            .nodes
            .get(&node)
            .map(|n| n.outputs.clone())
            .unwrap_or_default()
    }

    pub fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner.state().nodes.get(&node).map(|n| n.kind)
    }

    pub fn node_exists(&self, node: NodeId) -> bool {
        self.inner.state().nodes.contains_key(&node)
    }

    /// Number of live nodes of `kind`
    pub fn count_nodes(&self, kind: NodeKind) -> usize {
        self.inner
            .state()
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .count()
    }

    /// Live sources, ordered by id
    pub fn active_sources(&self) -> Vec<SourceInfo> {
        let now = self.inner.now();
        let state = self.inner.state();
        let mut sources: Vec<SourceInfo> = state
            .sources
            .iter()
            .map(|(id, s)| SourceInfo {
                id: *id,
                buffer_duration: s.audio.duration,
                destination: s.destination,
                offset: s.offset_at(now),
                playback_rate: s.playback_rate,
            })
            .collect();
        sources.sort_by_key(|s| s.id);
        sources
    }

    pub fn active_source_count(&self) -> usize {
        self.inner.state().sources.len()
    }

    /// Total sources started since construction
    pub fn sources_started(&self) -> u64 {
        self.inner.state().sources_started
    }

    fn allocate(&self, kind: NodeKind) -> Result<NodeId> {
        if self.inner.fail_node_creation.load(Ordering::SeqCst) {
            return Err(Error::Graph(format!("failed to create {:?} node", kind)));
        }
        let id = NodeId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.state().nodes.insert(id, NodeState::new(kind));
        trace!("Created {:?} {}", kind, id);
        Ok(id)
    }

    fn with_node<T>(&self, node: NodeId, f: impl FnOnce(&mut NodeState) -> T) -> Result<T> {
        let mut state = self.inner.state();
        state
            .nodes
            .get_mut(&node)
            .map(f)
            .ok_or_else(|| Error::Graph(format!("unknown {}", node)))
    }

    /// Spawn the natural-end notification for a source
    fn arm_end_task(&self, source: SourceId, delay_secs: f64) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let weak: Weak<VirtualGraphInner> = Arc::downgrade(&self.inner);
        Some(handle.spawn(async move {
            tokio::time::sleep(secs_to_duration(delay_secs)).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let removed = {
                let mut state = inner.state();
                state.sources.remove(&source).map(|mut s| {
                    // This task is the end task; dropping its own handle must not abort it
                    s.end_task.take();
                })
            };
            if removed.is_some() {
                debug!("Virtual {} reached end of buffer", source);
                inner.notify(GraphEvent::SourceEnded { source });
            }
        }))
    }
}

impl AudioGraph for VirtualGraph {
    fn current_time(&self) -> f64 {
        self.inner.now()
    }

    fn master(&self) -> NodeId {
        self.inner.master
    }

    fn create_gain(&self) -> Result<NodeId> {
        self.allocate(NodeKind::Gain)
    }

    fn create_pan(&self) -> Result<NodeId> {
        self.allocate(NodeKind::Pan)
    }

    fn create_pitch_unit(&self) -> Result<NodeId> {
        self.allocate(NodeKind::PitchUnit)
    }

    fn destroy(&self, node: NodeId) {
        if node == self.inner.master {
            return;
        }
        let mut state = self.inner.state();
        state.nodes.remove(&node);
        for other in state.nodes.values_mut() {
            other.outputs.retain(|o| *o != node);
        }
    }

    fn connect(&self, from: NodeId, to: NodeId) -> Result<()> {
        let mut state = self.inner.state();
        if !state.nodes.contains_key(&to) {
            return Err(Error::Graph(format!("cannot connect to unknown {}", to)));
        }
        let source = state
            .nodes
            .get_mut(&from)
            .ok_or_else(|| Error::Graph(format!("cannot connect from unknown {}", from)))?;
        if !source.outputs.contains(&to) {
            source.outputs.push(to);
        }
        Ok(())
    }

    fn disconnect(&self, node: NodeId) {
        if let Some(n) = self.inner.state().nodes.get_mut(&node) {
            n.outputs.clear();
        }
    }

    fn set_gain(&self, node: NodeId, value: f32) -> Result<()> {
        self.with_node(node, |n| n.gain = GainParam::new(value))
    }

    fn set_gain_target(
        &self,
        node: NodeId,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<()> {
        if self.inner.fail_gain_ramps.load(Ordering::SeqCst) {
            return Err(Error::Graph(format!("failed to ramp {}", node)));
        }
        let now = self.inner.now();
        self.with_node(node, |n| {
            n.gain.hold(now);
            n.gain.ramp = Some(GainRamp::new(n.gain.value, target, start_time, time_constant));
        })
    }

    fn cancel_gain_ramps(&self, node: NodeId) -> Result<()> {
        let now = self.inner.now();
        self.with_node(node, |n| n.gain.hold(now))
    }

    fn set_pan(&self, node: NodeId, pan: f32) -> Result<()> {
        self.with_node(node, |n| n.pan = pan.clamp(-1.0, 1.0))
    }

    fn set_pitch_params(&self, node: NodeId, params: PitchParams) -> Result<()> {
        self.with_node(node, |n| n.pitch = params)
    }

    fn start_source(
        &self,
        audio: &DecodedAudio,
        destination: NodeId,
        offset: f64,
        playback_rate: f64,
    ) -> Result<SourceId> {
        if playback_rate <= 0.0 || !playback_rate.is_finite() {
            return Err(Error::Graph(format!("invalid playback rate {}", playback_rate)));
        }
        let now = self.inner.now();
        let id = SourceId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let source = SourceState {
            audio: *audio,
            destination,
            anchor_offset: offset.clamp(0.0, audio.duration),
            anchor_time: now,
            playback_rate,
            end_task: None,
        };
        let remaining = source.remaining_wall_secs(now);
        {
            let mut state = self.inner.state();
            if !state.nodes.contains_key(&destination) {
                return Err(Error::Graph(format!("source destination {} unknown", destination)));
            }
            state.sources.insert(id, source);
            state.sources_started += 1;
        }
        let task = self.arm_end_task(id, remaining);
        if let Some(s) = self.inner.state().sources.get_mut(&id) {
            s.end_task = task;
        }
        trace!("Started {} at offset {:.3} rate {:.2}", id, offset, playback_rate);
        Ok(id)
    }

    fn stop_source(&self, source: SourceId) {
        // Dropping the state aborts its end task
        let removed = self.inner.state().sources.remove(&source);
        drop(removed);
    }

    fn set_playback_rate(&self, source: SourceId, playback_rate: f64) -> Result<()> {
        if playback_rate <= 0.0 || !playback_rate.is_finite() {
            return Err(Error::Graph(format!("invalid playback rate {}", playback_rate)));
        }
        let now = self.inner.now();
        let remaining = {
            let mut state = self.inner.state();
            let s = state
                .sources
                .get_mut(&source)
                .ok_or_else(|| Error::Graph(format!("unknown {}", source)))?;
            s.anchor_offset = s.offset_at(now);
            s.anchor_time = now;
            s.playback_rate = playback_rate;
            if let Some(task) = s.end_task.take() {
                task.abort();
            }
            s.remaining_wall_secs(now)
        };
        let task = self.arm_end_task(source, remaining);
        if let Some(s) = self.inner.state().sources.get_mut(&source) {
            s.end_task = task;
        }
        Ok(())
    }

    fn set_event_sink(&self, sink: mpsc::UnboundedSender<GraphEvent>) {
        *self.inner.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let graph = VirtualGraph::new();
        let t0 = graph.current_time();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!((graph.current_time() - t0 - 0.5).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gain_ramp_approaches_target() {
        let graph = VirtualGraph::new();
        let gain = graph.create_gain().unwrap();
        graph.set_gain(gain, 1.0).unwrap();
        graph
            .set_gain_target(gain, 0.0, graph.current_time(), 0.01)
            .unwrap();
        assert_eq!(graph.gain_target(gain), Some(0.0));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(graph.gain(gain).unwrap() < 0.001);

        graph.cancel_gain_ramps(gain).unwrap();
        assert!(graph.gain_ramp(gain).is_none());
        assert!(graph.gain(gain).unwrap() < 0.001);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_removes_incoming_connections() {
        let graph = VirtualGraph::new();
        let gain = graph.create_gain().unwrap();
        let unit = graph.create_pitch_unit().unwrap();
        graph.connect(gain, unit).unwrap();
        graph.connect(unit, graph.master()).unwrap();
        assert_eq!(graph.outputs(gain), vec![unit]);

        graph.destroy(unit);
        assert!(graph.outputs(gain).is_empty());
        assert!(!graph.node_exists(unit));
        assert!(graph.node_exists(graph.master()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_ends_naturally_and_notifies() {
        let graph = VirtualGraph::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        graph.set_event_sink(tx);
        let gain = graph.create_gain().unwrap();
        let audio = DecodedAudio::new(2.0);

        let source = graph.start_source(&audio, gain, 1.0, 2.0).unwrap();
        assert_eq!(graph.active_source_count(), 1);

        // One buffer second left at double rate
        let event = tokio::time::timeout(Duration::from_millis(600), rx.recv())
            .await
            .expect("source should end within its remaining time");
        assert_eq!(event, Some(GraphEvent::SourceEnded { source }));
        assert_eq!(graph.active_source_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_source_does_not_notify() {
        let graph = VirtualGraph::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        graph.set_event_sink(tx);
        let gain = graph.create_gain().unwrap();
        let source = graph
            .start_source(&DecodedAudio::new(1.0), gain, 0.0, 1.0)
            .unwrap();
        graph.stop_source(source);

        let result = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_change_keeps_offset_continuous() {
        let graph = VirtualGraph::new();
        let gain = graph.create_gain().unwrap();
        let source = graph
            .start_source(&DecodedAudio::new(60.0), gain, 10.0, 1.0)
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        graph.set_playback_rate(source, 2.0).unwrap();
        let before = graph.active_sources()[0].offset;
        assert!((before - 12.0).abs() < 1e-6);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!((graph.active_sources()[0].offset - 14.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_creation_failure_injection() {
        let graph = VirtualGraph::new();
        graph.set_fail_node_creation(true);
        assert!(matches!(graph.create_pitch_unit(), Err(Error::Graph(_))));
        graph.set_fail_node_creation(false);
        assert!(graph.create_pitch_unit().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gain_ramp_failure_injection() {
        let graph = VirtualGraph::new();
        let gain = graph.create_gain().unwrap();
        graph.set_fail_gain_ramps(true);
        assert!(matches!(
            graph.set_gain_target(gain, 0.0, graph.current_time(), 0.01),
            Err(Error::Graph(_))
        ));
        // Plain sets are unaffected
        graph.set_gain(gain, 0.5).unwrap();
        assert_eq!(graph.gain(gain), Some(0.5));
    }
}
