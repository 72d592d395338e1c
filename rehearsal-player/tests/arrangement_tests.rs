//! Skip and loop behaviour driven by the frame poller
//!
//! Songs with disabled sections and loop regions played in real (paused)
//! time: tolerance windows, loop-over-skip precedence, pre-emptive skips
//! and the advance-or-stop fallback.

mod helpers;

use helpers::{advance, assert_close, plain_song, SongBuilder, TestEngine};
use rehearsal_common::{PlaybackState, RehearsalEvent, TransitionKind};
use rehearsal_player::Error;

#[tokio::test(start_paused = true)]
async fn test_loop_end_within_tolerance_jumps_back() {
    let mut t = TestEngine::new();
    t.load(SongBuilder::new("loop").track(60.0).looping(10.0, 20.0).build())
        .await;

    t.engine.play(Some(20.05)).await.unwrap();
    advance(0.5).await;

    let loops = t.drain_transitions(TransitionKind::Loop);
    assert_eq!(loops.len(), 1);
    assert_close(loops[0].1, 10.0);

    let position = t.engine.position().await;
    assert!(position > 10.0 && position < 10.6, "position {position}");
}

#[tokio::test(start_paused = true)]
async fn test_position_far_past_loop_end_does_not_loop() {
    let mut t = TestEngine::new();
    t.load(SongBuilder::new("loop").track(60.0).looping(10.0, 20.0).build())
        .await;

    t.engine.play(Some(21.0)).await.unwrap();
    advance(1.0).await;

    assert!(t.drain_transitions(TransitionKind::Loop).is_empty());
    assert_close(t.engine.position().await, 22.0);
}

#[tokio::test(start_paused = true)]
async fn test_reaching_loop_end_loops_repeatedly() {
    let mut t = TestEngine::new();
    t.load(SongBuilder::new("loop").track(60.0).looping(10.0, 12.0).build())
        .await;

    t.engine.play(Some(10.0)).await.unwrap();
    advance(5.0).await;

    // Two-second region: at least two passes in five seconds
    let loops = t.drain_transitions(TransitionKind::Loop);
    assert!(loops.len() >= 2, "loops {loops:?}");
    for (from, to) in loops {
        assert!((11.99..12.1).contains(&from), "looped from {from}");
        assert_close(to, 10.0);
    }
    let position = t.engine.position().await;
    assert!((10.0..12.0).contains(&position), "position {position}");
}

#[tokio::test(start_paused = true)]
async fn test_disabled_section_inside_loop_loops_back_instead_of_skipping() {
    let mut t = TestEngine::new();
    let song = SongBuilder::new("loop over gap")
        .track(60.0)
        .sections(&[(0.0, 15.0, true), (15.0, 18.0, false), (18.0, 60.0, true)])
        .looping(10.0, 20.0)
        .build();
    t.load(song).await;

    t.engine.play(Some(14.0)).await.unwrap();
    advance(1.5).await;

    let events = t.drain_events();
    let kinds: Vec<TransitionKind> = events
        .iter()
        .filter_map(|e| match e {
            RehearsalEvent::TransitionCompleted { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec![TransitionKind::Loop]);

    let position = t.engine.position().await;
    assert!(position > 10.0 && position < 11.0, "position {position}");
}

#[tokio::test(start_paused = true)]
async fn test_preemptive_skip_completes_before_disabled_section() {
    let mut t = TestEngine::new();
    let song = SongBuilder::new("gap")
        .track(60.0)
        .track(60.0)
        .sections(&[(0.0, 15.0, true), (15.0, 18.0, false), (18.0, 60.0, true)])
        .build();
    t.load(song).await;

    t.engine.play(Some(14.0)).await.unwrap();
    advance(1.5).await;

    let skips = t.drain_transitions(TransitionKind::Skip);
    assert_eq!(skips.len(), 1);
    let (from, to) = skips[0];
    // The fade began inside the lookahead window, before the boundary
    assert!(from < 15.0 && from > 14.9, "skip began at {from}");
    assert_close(to, 18.0);

    let position = t.engine.position().await;
    assert!(position > 18.0 && position < 19.0, "position {position}");
    assert_eq!(t.graph.active_source_count(), 2);
    for source in t.graph.active_sources() {
        assert!(source.offset >= 18.0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_arrangement_stops_without_chain() {
    let mut t = TestEngine::new();
    let song = SongBuilder::new("tail disabled")
        .track(60.0)
        .sections(&[(0.0, 15.0, true), (15.0, 60.0, false)])
        .build();
    let song_id = t.load(song).await;

    t.engine.play(Some(13.0)).await.unwrap();
    advance(3.0).await;

    assert_eq!(t.engine.state().await, PlaybackState::Stopped);
    assert_close(t.engine.position().await, 13.0);
    assert_eq!(t.graph.active_source_count(), 0);

    let ended: Vec<bool> = t
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            RehearsalEvent::SongEnded { song_id: id, advanced, .. } if id == song_id => {
                Some(advanced)
            }
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec![false]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_arrangement_with_loop_loops_back() {
    let mut t = TestEngine::new();
    let song = SongBuilder::new("tail disabled, looped")
        .track(60.0)
        .sections(&[(0.0, 15.0, true), (15.0, 60.0, false)])
        .looping(5.0, 40.0)
        .build();
    t.load(song).await;

    t.engine.play(Some(13.0)).await.unwrap();
    advance(3.0).await;

    assert_eq!(t.engine.state().await, PlaybackState::Playing);
    let loops = t.drain_transitions(TransitionKind::Loop);
    assert_eq!(loops.len(), 1);
    assert_close(loops[0].1, 5.0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_loop_falls_back_to_stop() {
    let t = TestEngine::new();
    // Loop start resolves forward to 22, past the loop end
    let song = SongBuilder::new("bad loop")
        .track(60.0)
        .sections(&[(0.0, 8.0, true), (8.0, 22.0, false), (22.0, 60.0, true)])
        .looping(9.0, 20.0)
        .build();
    t.load(song).await;

    t.engine.play(Some(6.0)).await.unwrap();
    advance(3.0).await;

    assert_eq!(t.engine.state().await, PlaybackState::Stopped);
    assert_close(t.engine.position().await, 6.0);
}

#[tokio::test(start_paused = true)]
async fn test_toggling_section_while_playing_reschedules() {
    let mut t = TestEngine::new();
    let song = SongBuilder::new("sections")
        .track(60.0)
        .sections(&[(0.0, 10.0, true), (10.0, 20.0, true), (20.0, 60.0, true)])
        .build();
    t.load(song).await;

    t.engine.play(Some(8.0)).await.unwrap();
    let enabled = t.engine.toggle_arrangement_section(1).await.unwrap();
    assert!(!enabled);
    advance(2.5).await;

    let skips = t.drain_transitions(TransitionKind::Skip);
    assert_eq!(skips.len(), 1);
    assert_close(skips[0].1, 20.0);
}

#[tokio::test(start_paused = true)]
async fn test_arrangement_edits_are_validated() {
    let t = TestEngine::new();
    t.load(plain_song()).await;

    let gap = vec![
        rehearsal_player::model::ArrangementSection::new(0.0, 10.0, true),
        rehearsal_player::model::ArrangementSection::new(12.0, 60.0, true),
    ];
    let result = t.engine.set_arrangement(gap).await;
    assert!(matches!(result, Err(Error::InvalidParameter(_))));

    let result = t.engine.set_arrangement(Vec::new()).await;
    assert!(matches!(result, Err(Error::InvalidParameter(_))));

    let result = t.engine.toggle_arrangement_section(5).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_loop_edits_are_validated_and_announced() {
    let mut t = TestEngine::new();
    t.load(plain_song()).await;
    t.drain_events();

    assert!(matches!(
        t.engine.set_loop(20.0, 10.0).await,
        Err(Error::InvalidParameter(_))
    ));

    t.engine.set_loop(10.0, 20.0).await.unwrap();
    t.engine.set_loop_enabled(false).await.unwrap();
    t.engine.clear_loop().await.unwrap();

    let updates: Vec<(bool, Option<f64>, Option<f64>)> = t
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            RehearsalEvent::LoopUpdated { enabled, start, end, .. } => Some((enabled, start, end)),
            _ => None,
        })
        .collect();
    assert_eq!(
        updates,
        vec![
            (true, Some(10.0), Some(20.0)),
            (false, Some(10.0), Some(20.0)),
            (false, None, None),
        ]
    );
}
