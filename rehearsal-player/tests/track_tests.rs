//! Adding and removing tracks on a loaded song
//!
//! A removed track's gain/pan chain is released immediately; an added track
//! joins playback at the current position.

mod helpers;

use helpers::{advance, assert_close, plain_song, SongBuilder, TestEngine};
use rehearsal_common::{PlaybackState, RehearsalEvent};
use rehearsal_player::model::{DecodedAudio, Song, Track};
use rehearsal_player::playback::virtual_graph::NodeKind;
use rehearsal_player::Error;
use uuid::Uuid;

#[tokio::test(start_paused = true)]
async fn test_added_track_joins_playback_in_place() {
    let mut t = TestEngine::new();
    t.load(plain_song()).await;
    t.engine.play(Some(10.0)).await.unwrap();
    advance(2.0).await;
    t.drain_events();

    let keys = Track::new("keys", DecodedAudio::new(60.0));
    let keys_id = keys.id;
    t.engine.add_track(keys).await.unwrap();

    assert_eq!(t.graph.active_source_count(), 3);
    assert_eq!(t.graph.count_nodes(NodeKind::Gain), 3);
    let newest = t.graph.active_sources().into_iter().last().unwrap();
    assert_close(newest.offset, 12.0);
    assert!(t.engine.track_audibility(keys_id).await.unwrap());

    let added: Vec<Uuid> = t
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            RehearsalEvent::TrackAdded { track_id, .. } => Some(track_id),
            _ => None,
        })
        .collect();
    assert_eq!(added, vec![keys_id]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_track_is_rejected() {
    let t = TestEngine::new();
    let song = plain_song();
    let existing = song.tracks[0].clone();
    t.load(song).await;

    let result = t.engine.add_track(existing).await;
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
    assert_eq!(t.graph.count_nodes(NodeKind::Gain), 2);
}

#[tokio::test(start_paused = true)]
async fn test_removed_track_releases_its_nodes() {
    let mut t = TestEngine::new();
    let song = plain_song();
    let (gone, kept) = (song.tracks[0].id, song.tracks[1].id);
    t.load(song).await;
    t.engine.play(None).await.unwrap();
    t.drain_events();

    t.engine.remove_track(gone).await.unwrap();

    assert_eq!(t.engine.state().await, PlaybackState::Playing);
    assert_eq!(t.graph.active_source_count(), 1);
    assert_eq!(t.graph.count_nodes(NodeKind::Gain), 1);
    assert_eq!(t.graph.count_nodes(NodeKind::Pan), 1);
    assert!(t.engine.track_audibility(kept).await.unwrap());
    assert!(matches!(
        t.engine.track_audibility(gone).await,
        Err(Error::NotFound(_))
    ));
    assert!(t.drain_events().iter().any(|e| matches!(
        e,
        RehearsalEvent::TrackRemoved { track_id, .. } if *track_id == gone
    )));

    let again = t.engine.remove_track(gone).await;
    assert!(matches!(again, Err(Error::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_removing_soloed_track_unsilences_the_rest() {
    let t = TestEngine::new();
    let song = plain_song();
    let (soloed, other) = (song.tracks[0].id, song.tracks[1].id);
    t.load(song).await;
    t.engine.set_track_solo(soloed, true).await.unwrap();
    t.engine.play(None).await.unwrap();
    assert!(!t.engine.track_audibility(other).await.unwrap());

    t.engine.remove_track(soloed).await.unwrap();

    assert!(t.engine.track_audibility(other).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_removing_last_sounding_track_ends_the_song() {
    let mut t = TestEngine::new();
    let song = SongBuilder::new("solo stem").track(60.0).build();
    let track_id = song.tracks[0].id;
    let song_id = t.load(song).await;
    t.engine.play(Some(5.0)).await.unwrap();
    advance(1.0).await;

    t.engine.remove_track(track_id).await.unwrap();

    assert_eq!(t.engine.state().await, PlaybackState::Stopped);
    assert_close(t.engine.position().await, 5.0);
    let ended: Vec<(Uuid, bool)> = t
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            RehearsalEvent::SongEnded {
                song_id, advanced, ..
            } => Some((song_id, advanced)),
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec![(song_id, false)]);
}

#[tokio::test(start_paused = true)]
async fn test_song_without_tracks_loads_and_ignores_play() {
    let t = TestEngine::new();
    t.load(Song::new("empty", Vec::new())).await;

    t.engine.play(None).await.unwrap();
    assert_eq!(t.engine.state().await, PlaybackState::Stopped);
    assert_eq!(t.graph.sources_started(), 0);

    // The first track with audio brings an arrangement with it
    t.engine
        .add_track(Track::new("click", DecodedAudio::new(30.0)))
        .await
        .unwrap();
    t.engine.play(None).await.unwrap();
    assert_eq!(t.engine.state().await, PlaybackState::Playing);
    let snapshot = t.engine.snapshot().await;
    assert_eq!(snapshot.song.unwrap().arrangement.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_length_tracks_load_as_silent_song() {
    let t = TestEngine::new();
    t.load(SongBuilder::new("silent").track(0.0).build()).await;

    t.engine.play(None).await.unwrap();
    assert_eq!(t.engine.state().await, PlaybackState::Stopped);
    assert_eq!(t.graph.sources_started(), 0);
}
