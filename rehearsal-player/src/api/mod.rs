//! HTTP control surface
//!
//! REST commands for the engine plus an SSE stream of engine events.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
