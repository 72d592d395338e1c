//! # Rehearsal Common Library
//!
//! Shared code for the rehearsal player engine and its clients:
//! - Event types (RehearsalEvent enum) and the EventBus
//! - Playback state enumerations
//! - Gain ramp math (exponential approach automation)
//! - Human-readable position formatting
//! - Configuration file resolution

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod ramp;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, PlaybackState, RehearsalEvent, TransitionKind};
