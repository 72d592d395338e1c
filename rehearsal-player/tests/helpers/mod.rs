//! Test helpers for rehearsal-player integration tests
//!
//! Provides reusable test infrastructure:
//! - TestEngine: engine wired to an inspectable VirtualGraph
//! - SongBuilder: songs with arrangements, loops and mute sections
//! - Event and timing helpers for paused-clock tests
//!
//! Every engine test runs under `#[tokio::test(start_paused = true)]`, so
//! the virtual audio clock, the frame poller and the predictive timers all
//! advance together and deterministically.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rehearsal_common::{EventBus, RehearsalEvent, TransitionKind};
use rehearsal_player::config::EngineConfig;
use rehearsal_player::model::{ArrangementSection, DecodedAudio, MuteSection, Song, Track};
use rehearsal_player::playback::{MashupChain, NoChain, PlaybackEngine, VirtualGraph};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Position comparisons in paused-clock tests
pub const POSITION_TOLERANCE: f64 = 1e-3;

/// Engine plus the virtual host it drives
pub struct TestEngine {
    pub engine: PlaybackEngine,
    pub graph: VirtualGraph,
    pub events: EventBus,
    rx: broadcast::Receiver<RehearsalEvent>,
}

impl TestEngine {
    /// Default config, no chaining
    pub fn new() -> Self {
        Self::with(test_config(), Arc::new(NoChain))
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with(config, Arc::new(NoChain))
    }

    pub fn with_chain(chain: Arc<dyn MashupChain>) -> Self {
        Self::with(test_config(), chain)
    }

    pub fn with(config: EngineConfig, chain: Arc<dyn MashupChain>) -> Self {
        let graph = VirtualGraph::new();
        let events = EventBus::new(config.event_capacity);
        let rx = events.subscribe();
        let engine = PlaybackEngine::new(config, Arc::new(graph.clone()), chain, events.clone());
        Self {
            engine,
            graph,
            events,
            rx,
        }
    }

    /// Load `song` and return its id
    pub async fn load(&self, song: Song) -> uuid::Uuid {
        let id = song.id;
        self.engine.load_song(song).await.unwrap();
        id
    }

    /// Every event emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<RehearsalEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    /// Completed transitions of `kind` since the last drain
    pub fn drain_transitions(&mut self, kind: TransitionKind) -> Vec<(f64, f64)> {
        self.drain_events()
            .into_iter()
            .filter_map(|event| match event {
                RehearsalEvent::TransitionCompleted { kind: k, from, to, .. } if k == kind => {
                    Some((from, to))
                }
                _ => None,
            })
            .collect()
    }
}

/// Default engine config with room for long event histories
pub fn test_config() -> EngineConfig {
    EngineConfig {
        event_capacity: 8192,
        ..Default::default()
    }
}

/// Builder for test songs
pub struct SongBuilder {
    title: String,
    durations: Vec<f64>,
    sections: Option<Vec<ArrangementSection>>,
    loop_region: Option<(f64, f64)>,
    mute_sections: Vec<(usize, Vec<MuteSection>)>,
}

impl SongBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            durations: Vec::new(),
            sections: None,
            loop_region: None,
            mute_sections: Vec::new(),
        }
    }

    /// Add a track with `duration` seconds of decoded audio
    pub fn track(mut self, duration: f64) -> Self {
        self.durations.push(duration);
        self
    }

    /// Arrangement as `(start, end, enabled)` triples
    pub fn sections(mut self, layout: &[(f64, f64, bool)]) -> Self {
        self.sections = Some(
            layout.iter()
                .map(|&(start, end, enabled)| ArrangementSection::new(start, end, enabled))
                .collect(),
        );
        self
    }

    /// Enabled loop region
    pub fn looping(mut self, start: f64, end: f64) -> Self {
        self.loop_region = Some((start, end));
        self
    }

    /// Time-range mutes for track `index` as `(start, end, muted)` triples
    pub fn mutes(mut self, index: usize, layout: &[(f64, f64, bool)]) -> Self {
        self.mute_sections.push((
            index,
            layout.iter()
                .map(|&(start, end, muted)| MuteSection::new(start, end, muted))
                .collect(),
        ));
        self
    }

    pub fn build(self) -> Song {
        let tracks = self
            .durations
            .iter()
            .enumerate()
            .map(|(i, d)| Track::new(format!("stem {}", i + 1), DecodedAudio::new(*d)))
            .collect();
        let mut song = Song::new(self.title, tracks);
        if let Some(sections) = self.sections {
            song.arrangement = sections;
        }
        if let Some((start, end)) = self.loop_region {
            song.transport.loop_enabled = true;
            song.transport.loop_start = Some(start);
            song.transport.loop_end = Some(end);
        }
        for (index, sections) in self.mute_sections {
            song.tracks[index].mute_sections = sections;
        }
        song
    }
}

/// Two 60-second stems, fully enabled
pub fn plain_song() -> Song {
    SongBuilder::new("plain").track(60.0).track(60.0).build()
}

/// Let `secs` of (paused) wall-clock time pass
pub async fn advance(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

#[track_caller]
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < POSITION_TOLERANCE,
        "expected {expected}, got {actual}"
    );
}
