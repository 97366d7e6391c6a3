//! Scripted end-to-end passes over the reconciler core: a listening
//! session as the tick loop would drive it, minus the network.

use nowbar::api::models::{Artist, NowPlaying, Track};
use nowbar::engine::reconciler::{PollOutcome, Reconciler};
use nowbar::engine::state::PositionSource;
use nowbar::Settings;

const TICK_MS: u64 = 50;

fn settings() -> Settings {
    Settings {
        client_id: "test".into(),
        ..Settings::default()
    }
}

fn track(id: &str, duration_ms: u64) -> Track {
    Track {
        id: id.into(),
        name: format!("Track {}", id),
        duration_ms,
        artists: vec![Artist {
            name: "Artist".into(),
        }],
        album: None,
    }
}

fn live(id: &str, progress_ms: u64, is_playing: bool, liked: bool) -> PollOutcome {
    PollOutcome {
        now: NowPlaying::Live {
            track: track(id, 240_000),
            progress_ms,
            is_playing,
        },
        liked: Some(liked),
    }
}

/// Advance until the reconciler asks for a poll, then answer it.
fn serve_poll(reconciler: &mut Reconciler, outcome: PollOutcome) {
    for _ in 0..200 {
        if let Some(request) = reconciler.on_tick(true, TICK_MS, false) {
            reconciler.apply_poll(request.issued_seq, outcome);
            return;
        }
    }
    panic!("no poll requested within 200 ticks");
}

#[test]
fn full_session_walkthrough() {
    let mut reconciler = Reconciler::new(&settings());

    // Cold start: nothing known, first poll finds a playing track.
    assert!(reconciler.state().is_none());
    serve_poll(&mut reconciler, live("a", 30_000, true, false));
    let state = reconciler.state().unwrap();
    assert!(state.is_playing);
    assert_eq!(state.position_ms, 30_000);

    // Smooth progress between polls.
    for _ in 0..10 {
        reconciler.on_tick(true, TICK_MS, true);
    }
    let state = reconciler.state().unwrap();
    assert_eq!(state.position_ms, 30_000 + 10 * TICK_MS);
    assert_eq!(state.source, PositionSource::Extrapolated);

    // User pauses; a poll that left before the click lands afterwards
    // still claiming "playing". The optimistic pause wins.
    let pause = reconciler.request_pause().unwrap();
    reconciler.apply_poll(0, live("a", 31_000, true, false));
    assert!(!reconciler.state().unwrap().is_playing);

    // The control call is acknowledged and the forced re-poll confirms.
    reconciler.on_control_success(pause.seq);
    let request = reconciler
        .on_tick(true, TICK_MS, false)
        .expect("ack must force a re-poll");
    reconciler.apply_poll(request.issued_seq, live("a", 31_000, false, false));
    let state = reconciler.state().unwrap();
    assert!(!state.is_playing);

    // Paused: position frozen across a whole window.
    let frozen = reconciler.state().unwrap().position_ms;
    for _ in 0..50 {
        if reconciler.on_tick(true, TICK_MS, false).is_some() {
            reconciler.poll_failed();
        }
    }
    assert_eq!(reconciler.state().unwrap().position_ms, frozen);

    // Two quick scrubs: only the second target survives, and the
    // superseded call's late failure changes nothing.
    let first = reconciler.request_seek(90_000).unwrap();
    let second = reconciler.request_seek(120_000).unwrap();
    assert_eq!(reconciler.state().unwrap().position_ms, 120_000);
    reconciler.on_control_failure(first.seq);
    assert_eq!(reconciler.state().unwrap().position_ms, 120_000);
    reconciler.on_control_success(second.seq);

    // Re-poll after the seek settles within the jitter threshold: the
    // local value stays put.
    let request = reconciler.on_tick(true, TICK_MS, false).unwrap();
    reconciler.apply_poll(request.issued_seq, live("a", 120_400, false, false));
    assert_eq!(reconciler.state().unwrap().position_ms, 120_000);
}

#[test]
fn background_foreground_cycle() {
    let mut reconciler = Reconciler::new(&settings());
    serve_poll(&mut reconciler, live("a", 5_000, true, false));

    // Backgrounded for a minute of engine time: no polls, no movement.
    for _ in 0..1_200 {
        assert!(reconciler.on_tick(false, TICK_MS, false).is_none());
    }
    assert_eq!(reconciler.state().unwrap().position_ms, 5_000);

    // Back to the foreground: poll immediately, and the big position
    // jump from the remote is adopted (way past the jitter threshold).
    let request = reconciler.on_tick(true, TICK_MS, false).unwrap();
    reconciler.apply_poll(request.issued_seq, live("a", 65_000, true, true));
    let state = reconciler.state().unwrap();
    assert_eq!(state.position_ms, 65_000);
    assert_eq!(state.source, PositionSource::LivePoll);
    assert!(state.liked);
}

#[test]
fn session_ends_into_history_then_nothing() {
    let mut reconciler = Reconciler::new(&settings());
    serve_poll(&mut reconciler, live("a", 10_000, true, false));

    // Device went away: 204 path resolved to history.
    serve_poll(
        &mut reconciler,
        PollOutcome {
            now: NowPlaying::Historical {
                track: track("a", 240_000),
            },
            liked: Some(false),
        },
    );
    let state = reconciler.state().unwrap();
    assert!(!state.live);
    assert!(!state.is_playing);

    // Historical state never extrapolates.
    for _ in 0..100 {
        if reconciler.on_tick(true, TICK_MS, false).is_some() {
            reconciler.poll_failed();
        }
    }
    assert_eq!(reconciler.state().unwrap().position_ms, 0);

    // A brand-new account shape: no history at all.
    serve_poll(
        &mut reconciler,
        PollOutcome {
            now: NowPlaying::Empty,
            liked: None,
        },
    );
    assert!(reconciler.state().is_none());
}

#[test]
fn track_end_is_caught_promptly() {
    let mut reconciler = Reconciler::new(&settings());
    serve_poll(&mut reconciler, live("a", 239_000, true, false));

    // Inside the end margin the next tick polls despite a fresh budget,
    // and the advance to the next track replaces the state.
    let request = reconciler.on_tick(true, TICK_MS, false).unwrap();
    reconciler.apply_poll(request.issued_seq, live("b", 150, true, false));
    let state = reconciler.state().unwrap();
    assert_eq!(state.track.id, "b");
    assert_eq!(state.position_ms, 150);
}
