//! End-to-end tests for `GET /api/voice/wake`.

mod common;

use std::time::Duration;

use common::{SILENCE, SPEECH, next_control, send_frames, start_server, test_config};
use futures_util::StreamExt;
use parley_core::ControlKind;

#[tokio::test]
async fn wake_phrase_is_reported() {
    let server = start_server(test_config(), "Hey parley, are you there?").await;
    let mut client = server.connect("/api/voice/wake").await;

    // Calibrate, 500 ms of speech, then enough silence to close the run.
    send_frames(&mut client, &SILENCE, 20).await;
    send_frames(&mut client, &SPEECH, 25).await;
    send_frames(&mut client, &SILENCE, 15).await;

    let message = next_control(&mut client).await;
    assert_eq!(message.kind, ControlKind::Wake);
    assert_eq!(message.text.as_deref(), Some("Hey parley, are you there?"));
    assert!(server.tts.requests().is_empty());
}

#[tokio::test]
async fn other_speech_is_not_reported() {
    let server = start_server(test_config(), "what is the weather").await;
    let mut client = server.connect("/api/voice/wake").await;

    send_frames(&mut client, &SILENCE, 20).await;
    send_frames(&mut client, &SPEECH, 25).await;
    send_frames(&mut client, &SILENCE, 15).await;

    let next = tokio::time::timeout(Duration::from_millis(750), client.next()).await;
    assert!(next.is_err(), "unexpected message: {next:?}");
}
