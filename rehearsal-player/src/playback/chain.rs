//! Mashup chaining collaborator
//!
//! When a song runs out of playable content the engine asks the chain
//! whether it can advance. `true` means the chain has taken over the
//! transport: the engine must not also stop, and waits for the next song to
//! be loaded. The call is synchronous; the actual load/play of the next song
//! happens on the chain's own task.

use crate::model::Song;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Chain collaborator consulted when playback runs out
pub trait MashupChain: Send + Sync {
    /// Whether `song_id` belongs to a chain with an entry after it
    fn has_next(&self, song_id: Uuid) -> bool;

    /// Hand over to the entry after `song_id`; false means "stop normally"
    fn try_advance_to_next(&self, song_id: Uuid) -> bool;
}

/// No chaining: every song stops at its end
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChain;

impl MashupChain for NoChain {
    fn has_next(&self, _song_id: Uuid) -> bool {
        false
    }

    fn try_advance_to_next(&self, _song_id: Uuid) -> bool {
        false
    }
}

/// Ordered mashup list
///
/// Advancing sends the next song to the receiver returned by `new`; whoever
/// owns the receiver loads and plays it.
#[derive(Debug)]
pub struct ChainQueue {
    songs: Mutex<Vec<Song>>,
    tx: mpsc::UnboundedSender<Song>,
}

impl ChainQueue {
    pub fn new(songs: Vec<Song>) -> (Self, mpsc::UnboundedReceiver<Song>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                songs: Mutex::new(songs),
                tx,
            },
            rx,
        )
    }

    pub fn len(&self) -> usize {
        self.songs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First entry, for starting the chain
    pub fn first(&self) -> Option<Song> {
        self.songs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .cloned()
    }

    pub fn push(&self, song: Song) {
        self.songs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(song);
    }

    fn next_after(&self, song_id: Uuid) -> Option<Song> {
        let songs = self.songs.lock().unwrap_or_else(PoisonError::into_inner);
        let index = songs.iter().position(|s| s.id == song_id)?;
        songs.get(index + 1).cloned()
    }
}

impl MashupChain for ChainQueue {
    fn has_next(&self, song_id: Uuid) -> bool {
        self.next_after(song_id).is_some()
    }

    fn try_advance_to_next(&self, song_id: Uuid) -> bool {
        let Some(next) = self.next_after(song_id) else {
            debug!("Chain has no entry after {}", song_id);
            return false;
        };
        info!("Chain advancing to '{}'", next.title);
        // A dropped receiver means nobody can take over
        self.tx.send(next).is_ok()
    }
}
