//! End-to-end tests for `GET /api/voice/ws` over a real WebSocket.
//!
//! The server runs in-process on an ephemeral port with canned collaborators
//! (fixed transcript, two-fragment agent reply, silent TTS), so the whole
//! state machine runs in real time in well under a second.

mod common;

use common::{
    Received, next_control, next_event, say_something, start_server, test_config, wait_closed,
};
use futures_util::SinkExt;
use parley_core::{ControlKind, ControlMessage, ConversationState};
use tokio_tungstenite::tungstenite::Message;

/// Collect everything the server sends until it returns to Listening after
/// speaking.
async fn run_turn(client: &mut common::Client) -> (Vec<ConversationState>, Vec<String>, usize) {
    let mut states = Vec::new();
    let mut transcripts = Vec::new();
    let mut audio_frames = 0;
    loop {
        match next_event(client).await {
            Received::Control(message) => match message.kind {
                ControlKind::State => {
                    let state = message.state.unwrap();
                    states.push(state);
                    if state == ConversationState::Listening
                        && states.contains(&ConversationState::Speaking)
                    {
                        return (states, transcripts, audio_frames);
                    }
                }
                ControlKind::Transcript => transcripts.push(message.text.unwrap()),
                _ => {}
            },
            Received::Audio(_) => audio_frames += 1,
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn socket_starts_listening() {
    let server = start_server(test_config(), "unused").await;
    let mut client = server.connect("/api/voice/ws?session=kitchen").await;

    let first = next_control(&mut client).await;
    assert_eq!(first, ControlMessage::state(ConversationState::Listening));
}

#[tokio::test]
async fn full_turn_over_the_socket() {
    let server = start_server(test_config(), "what time is it").await;
    let mut client = server.connect("/api/voice/ws").await;
    assert_eq!(
        next_control(&mut client).await.state,
        Some(ConversationState::Listening)
    );

    say_something(&mut client).await;
    let (states, transcripts, audio_frames) = run_turn(&mut client).await;

    assert_eq!(
        states,
        vec![
            ConversationState::Processing,
            ConversationState::Speaking,
            ConversationState::Listening,
        ]
    );
    assert_eq!(transcripts, vec!["what time is it"]);
    assert!(audio_frames >= 1, "no playback audio received");

    let requests = server.tts.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "Hello there.");
    assert_eq!(requests[0].1, "af_sarah");
    assert_eq!(requests[0].2, 24_000);
}

#[tokio::test]
async fn config_message_changes_the_voice() {
    let server = start_server(test_config(), "what time is it").await;
    let mut client = server.connect("/api/voice/ws").await;
    next_control(&mut client).await;

    client
        .send(Message::Text(
            ControlMessage::config(Some(16_000), Some("bf_emma".into()))
                .to_json()
                .into(),
        ))
        .await
        .unwrap();
    say_something(&mut client).await;
    run_turn(&mut client).await;

    let requests = server.tts.requests();
    assert_eq!(requests[0].1, "bf_emma");
    assert_eq!(requests[0].2, 16_000);
}

#[tokio::test]
async fn malformed_text_frames_are_ignored() {
    let server = start_server(test_config(), "what time is it").await;
    let mut client = server.connect("/api/voice/ws").await;
    next_control(&mut client).await;

    client
        .send(Message::Text("not json".to_owned().into()))
        .await
        .unwrap();
    client
        .send(Message::Binary(vec![1, 2, 3].into()))
        .await
        .unwrap();
    say_something(&mut client).await;

    let (states, _, _) = run_turn(&mut client).await;
    assert_eq!(states.last(), Some(&ConversationState::Listening));
}

#[tokio::test]
async fn server_shutdown_closes_live_sockets() {
    let server = start_server(test_config(), "unused").await;
    let mut client = server.connect("/api/voice/ws").await;
    next_control(&mut client).await;

    server.shutdown.cancel();
    wait_closed(&mut client).await;
}
