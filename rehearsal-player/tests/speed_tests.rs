//! Speed and pitch changes
//!
//! Speed changes rebase the clock so the reported position never jumps.
//! Pitch changes only touch the primary pitch unit.

mod helpers;

use helpers::{advance, assert_close, plain_song, TestEngine};
use rehearsal_common::RehearsalEvent;
use rehearsal_player::Error;

fn transport_params(events: Vec<RehearsalEvent>) -> Vec<(f64, i32)> {
    events
        .into_iter()
        .filter_map(|e| match e {
            RehearsalEvent::TransportParamsChanged {
                speed,
                pitch_semitones,
                ..
            } => Some((speed, pitch_semitones)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_speed_change_keeps_position_continuous() {
    let mut t = TestEngine::new();
    t.load(plain_song()).await;
    t.engine.play(Some(30.0)).await.unwrap();
    advance(1.0).await;
    t.drain_events();

    t.engine.set_speed(2.0).await.unwrap();
    assert_close(t.engine.position().await, 31.0);

    advance(5.0).await;
    assert_close(t.engine.position().await, 41.0);

    for source in t.graph.active_sources() {
        assert_eq!(source.playback_rate, 2.0);
    }
    assert_eq!(transport_params(t.drain_events()), vec![(2.0, 0)]);
}

#[tokio::test(start_paused = true)]
async fn test_speed_set_before_play_applies_on_start() {
    let t = TestEngine::new();
    t.load(plain_song()).await;

    t.engine.set_speed(0.5).await.unwrap();
    t.engine.play(None).await.unwrap();
    advance(4.0).await;

    assert_close(t.engine.position().await, 2.0);
    assert_eq!(t.graph.active_sources()[0].playback_rate, 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_transport_params_rejected() {
    let t = TestEngine::new();
    t.load(plain_song()).await;

    assert!(matches!(
        t.engine.set_speed(2.5).await,
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        t.engine.set_speed(f64::NAN).await,
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        t.engine.set_pitch(7).await,
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        t.engine.set_pitch(-7).await,
        Err(Error::InvalidParameter(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_pitch_change_is_announced_without_restart() {
    let mut t = TestEngine::new();
    t.load(plain_song()).await;
    t.engine.play(None).await.unwrap();
    t.drain_events();

    t.engine.set_pitch(-3).await.unwrap();
    // Unchanged value: nothing to announce
    t.engine.set_pitch(-3).await.unwrap();

    assert_eq!(transport_params(t.drain_events()), vec![(1.0, -3)]);
    assert_eq!(t.graph.sources_started(), 2);
    let snapshot = t.engine.snapshot().await;
    assert_eq!(snapshot.song.unwrap().pitch_semitones, -3);
}
