//! Playback position and arrangement scheduling engine

pub mod arrangement;
pub mod audibility;
pub mod chain;
pub mod clock;
pub mod decision;
pub mod engine;
pub mod graph;
pub mod routing;
pub mod scheduler;
pub mod tolerance;
pub mod transition;
pub mod virtual_graph;

pub use chain::{ChainQueue, MashupChain, NoChain};
pub use decision::{EventKind, NextEvent};
pub use engine::{spawn_chain_driver, EngineSnapshot, PlaybackEngine};
pub use graph::{AudioGraph, GraphEvent, NodeId, PitchParams, SourceId};
pub use virtual_graph::VirtualGraph;
