//! # Rehearsal Player Library (rehearsal-player)
//!
//! Multitrack rehearsal playback engine driving a host audio graph.
//!
//! **Purpose:** Play a song's stems together with per-track volume, pan,
//! mute/solo and timed mute sections; follow a section arrangement that can
//! skip disabled regions; loop a region seamlessly; change speed and pitch
//! independently; and expose everything over HTTP/SSE.
//!
//! **Architecture:** A single control task owns engine state. A frame poller
//! (foreground) or predictive timers (background) decide when to skip, loop
//! or end; short gain fades cover every discontinuity.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod playback;
pub mod session;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
