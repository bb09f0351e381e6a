//! End-to-end tests for relay sessions started through the app state
//! Tests: prompt -> upstream SSE stream -> transcript updates + utterances

use std::sync::Barrier;
use std::time::Duration;

use relay_core::{update_channel, RelayHandle, RelayUpdate, Termination};
use voice_core::{PacedBackend, SpeechQueue};
use wiremock::MockServer;

use crate::common::*;

#[tokio::test]
async fn test_transcript_updates_follow_every_fragment() {
    let upstream = MockServer::start().await;
    mount_reply(&upstream, sse_reply(&GREETING)).await;
    let state = test_state(&upstream, None, test_config());

    let (updates, mut rx) = update_channel();
    let summary = state.begin("Say hello", updates).join().await.unwrap();

    let mut transcripts = Vec::new();
    while let Some(update) = rx.recv().await {
        if let RelayUpdate::Transcript { text } = update {
            transcripts.push(text);
        }
    }

    let mut running = String::new();
    let expected: Vec<String> = GREETING
        .iter()
        .map(|fragment| {
            running.push_str(fragment);
            running.clone()
        })
        .collect();
    assert_eq!(transcripts, expected);
    assert_eq!(summary.transcript, expected.last().unwrap().as_str());
}

#[tokio::test]
async fn test_new_session_interrupts_local_speaker() {
    let upstream = MockServer::start().await;
    mount_slow_reply(&upstream, sse_reply(&GREETING), Duration::from_secs(10)).await;
    let speech = SpeechQueue::spawn(PacedBackend::new(Duration::from_millis(1)));
    let state = test_state(&upstream, Some(speech), test_config());

    let (first_updates, _first_rx) = update_channel();
    let first = state.begin("first question", first_updates);

    let (second_updates, _second_rx) = update_channel();
    let second = state.begin("second question", second_updates);

    let summary = tokio::time::timeout(Duration::from_secs(5), first.join())
        .await
        .expect("first session should be cancelled promptly")
        .unwrap();
    assert_eq!(summary.termination, Some(Termination::Cancelled));

    second.cancel();
    let summary = second.join().await.unwrap();
    assert_eq!(summary.termination, Some(Termination::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_sessions_leave_one_local_speaker() {
    let upstream = MockServer::start().await;
    mount_slow_reply(&upstream, sse_reply(&GREETING), Duration::from_secs(10)).await;
    let speech = SpeechQueue::spawn(PacedBackend::new(Duration::from_millis(1)));
    let state = test_state(&upstream, Some(speech), test_config());
    let runtime = tokio::runtime::Handle::current();

    for round in 0..200 {
        let barrier = Barrier::new(2);
        let handles: Vec<RelayHandle> = std::thread::scope(|scope| {
            let starts: Vec<_> = ["first", "second"]
                .into_iter()
                .map(|prompt| {
                    let (state, barrier, runtime) = (&state, &barrier, &runtime);
                    scope.spawn(move || {
                        let _guard = runtime.enter();
                        let (updates, _rx) = update_channel();
                        barrier.wait();
                        state.begin(prompt, updates)
                    })
                })
                .collect();
            starts.into_iter().map(|start| start.join().unwrap()).collect()
        });

        let speaking = handles
            .iter()
            .filter(|handle| !handle.cancel_token().is_cancelled())
            .count();
        assert_eq!(speaking, 1, "round {round}: sessions sharing the local speaker");

        for handle in &handles {
            handle.cancel();
        }
    }
}

#[tokio::test]
async fn test_sessions_without_local_speech_run_side_by_side() {
    let upstream = MockServer::start().await;
    mount_reply(&upstream, sse_reply(&["Parallel", " reply"])).await;
    let state = test_state(&upstream, None, test_config());

    let (a, _rx_a) = update_channel();
    let (b, _rx_b) = update_channel();
    let first = state.begin("one", a);
    let second = state.begin("two", b);

    assert_ne!(first.session_id(), second.session_id());
    let (first, second) = tokio::join!(first.join(), second.join());
    assert_eq!(first.unwrap().termination, Some(Termination::Done));
    assert_eq!(second.unwrap().termination, Some(Termination::Done));
}
