//! Dual scheduler tests
//!
//! Backgrounded hosts stop the frame poller, so predictive timers alone must
//! carry skips, loops and mute boundaries. Foregrounding hands authority back
//! to the poller without handling any event twice.

mod helpers;

use helpers::{advance, assert_close, test_config, SongBuilder, TestEngine};
use rehearsal_common::{PlaybackState, RehearsalEvent, TransitionKind};
use rehearsal_player::config::EngineConfig;
use rehearsal_player::playback::EventKind;

fn gap_song() -> rehearsal_player::model::Song {
    SongBuilder::new("gap")
        .track(60.0)
        .sections(&[(0.0, 15.0, true), (15.0, 18.0, false), (18.0, 60.0, true)])
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_hidden_engine_skips_on_timer() {
    let mut t = TestEngine::new();
    t.load(gap_song()).await;

    t.engine.play(Some(10.0)).await.unwrap();
    t.engine.set_visibility(false).await.unwrap();

    assert!(!t.engine.is_poller_running().await);
    assert!(t.engine.is_timer_armed(EventKind::Skip).await);

    advance(6.0).await;

    let skips = t.drain_transitions(TransitionKind::Skip);
    assert_eq!(skips.len(), 1);
    assert_close(skips[0].1, 18.0);
    let position = t.engine.position().await;
    assert!(position > 18.0 && position < 19.5, "position {position}");

    // Still hidden: no poller came back, and nothing further to arm
    assert!(!t.engine.is_poller_running().await);
    assert!(!t.engine.is_timer_armed(EventKind::Skip).await);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_engine_loops_on_timer() {
    let mut t = TestEngine::new();
    t.load(SongBuilder::new("loop").track(60.0).looping(10.0, 20.0).build())
        .await;

    t.engine.play(Some(18.0)).await.unwrap();
    t.engine.set_visibility(false).await.unwrap();
    assert!(t.engine.is_timer_armed(EventKind::Loop).await);

    advance(2.5).await;

    let loops = t.drain_transitions(TransitionKind::Loop);
    assert_eq!(loops.len(), 1);
    assert_close(loops[0].1, 10.0);
    // Re-armed for the next pass
    assert!(t.engine.is_timer_armed(EventKind::Loop).await);
}

#[tokio::test(start_paused = true)]
async fn test_returning_to_foreground_cancels_timers() {
    let mut t = TestEngine::new();
    t.load(gap_song()).await;

    t.engine.play(Some(10.0)).await.unwrap();
    t.engine.set_visibility(false).await.unwrap();
    assert!(t.engine.is_timer_armed(EventKind::Skip).await);

    t.engine.set_visibility(true).await.unwrap();
    assert!(!t.engine.is_timer_armed(EventKind::Skip).await);
    assert!(t.engine.is_poller_running().await);

    // The poller alone performs the skip, exactly once
    advance(6.0).await;
    let skips = t.drain_transitions(TransitionKind::Skip);
    assert_eq!(skips.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poller_and_timer_handle_one_event_once() {
    let mut t = TestEngine::new();
    t.load(gap_song()).await;

    // Visible: both mechanisms are live
    t.engine.play(Some(13.0)).await.unwrap();
    assert!(t.engine.is_poller_running().await);
    assert!(t.engine.is_timer_armed(EventKind::Skip).await);

    advance(3.0).await;
    let skips = t.drain_transitions(TransitionKind::Skip);
    assert_eq!(skips.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_when_hidden() {
    let config = EngineConfig {
        pause_when_hidden: true,
        ..test_config()
    };
    let t = TestEngine::with_config(config);
    t.load(gap_song()).await;

    t.engine.play(None).await.unwrap();
    advance(2.0).await;
    t.engine.set_visibility(false).await.unwrap();

    assert_eq!(t.engine.state().await, PlaybackState::Paused);
    assert_close(t.engine.position().await, 2.0);
    assert!(!t.engine.is_timer_armed(EventKind::Skip).await);
}

#[tokio::test(start_paused = true)]
async fn test_speed_change_rearms_timer() {
    let mut t = TestEngine::new();
    t.load(gap_song()).await;

    t.engine.play(Some(10.0)).await.unwrap();
    t.engine.set_visibility(false).await.unwrap();
    t.engine.set_speed(2.0).await.unwrap();

    // Five song-seconds to the gap take 2.5s at double speed
    advance(2.6).await;
    let skips = t.drain_transitions(TransitionKind::Skip);
    assert_eq!(skips.len(), 1);
    assert_close(skips[0].1, 18.0);
}

#[tokio::test(start_paused = true)]
async fn test_seek_rearms_timer() {
    let mut t = TestEngine::new();
    t.load(gap_song()).await;

    t.engine.play(Some(2.0)).await.unwrap();
    t.engine.set_visibility(false).await.unwrap();
    t.engine.seek(14.0).await.unwrap();

    advance(1.5).await;
    let skips = t.drain_transitions(TransitionKind::Skip);
    assert_eq!(skips.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_engine_tracks_mute_boundaries() {
    let mut t = TestEngine::new();
    let song = SongBuilder::new("muted tail")
        .track(60.0)
        .track(60.0)
        .mutes(0, &[(0.0, 12.0, false), (12.0, 60.0, true)])
        .build();
    let track_id = song.tracks[0].id;
    t.load(song).await;

    t.engine.play(Some(10.0)).await.unwrap();
    t.engine.set_visibility(false).await.unwrap();
    assert!(t.engine.is_timer_armed(EventKind::MuteBoundary).await);
    t.drain_events();

    advance(2.5).await;

    assert!(!t.engine.track_audibility(track_id).await.unwrap());
    let changes: Vec<bool> = t
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            RehearsalEvent::TrackAudibilityChanged { track_id: id, audible, .. }
                if id == track_id =>
            {
                Some(audible)
            }
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![false]);
}

#[tokio::test(start_paused = true)]
async fn test_end_timer_only_armed_when_chained() {
    let t = TestEngine::new();
    t.load(SongBuilder::new("short").track(10.0).build()).await;

    t.engine.play(None).await.unwrap();
    assert!(!t.engine.is_timer_armed(EventKind::End).await);
}
