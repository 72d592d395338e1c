//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: Construction, shared state, control task
//! - `transport.rs`: Play/pause/stop/seek, speed and pitch
//! - `transitions.rs`: Faded skips and loops, advance-or-stop, source end
//! - `scheduling.rs`: Frame poller, predictive timers, visibility
//! - `editing.rs`: Song, arrangement, loop and track edits
//! - `queries.rs`: Position, audibility and snapshots

mod core;
mod editing;
mod queries;
mod scheduling;
mod transitions;
mod transport;

pub use self::core::PlaybackEngine;
pub use queries::{EngineSnapshot, SongSnapshot, TrackSnapshot, TransitionSnapshot};

use crate::model::Song;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Load and play each song the chain hands over
///
/// Pairs with the receiver returned by `ChainQueue::new`. The driver holds
/// the engine weakly and exits once the engine is dropped.
pub fn spawn_chain_driver(
    engine: &PlaybackEngine,
    mut next_songs: mpsc::UnboundedReceiver<Song>,
) -> JoinHandle<()> {
    let weak = engine.weak();
    tokio::spawn(async move {
        while let Some(song) = next_songs.recv().await {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let engine = PlaybackEngine { inner };
            let title = song.title.clone();
            if let Err(e) = engine.load_song(song).await {
                error!("Chain failed to load '{}': {}", title, e);
                continue;
            }
            if let Err(e) = engine.play(None).await {
                error!("Chain failed to start '{}': {}", title, e);
            }
        }
        info!("Chain driver stopped");
    })
}
