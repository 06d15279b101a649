//! `GET /api/voice/wake` - wake-word listening socket.
//!
//! The client streams PCM16 LE capture frames as binary messages. Each time
//! the wake phrase is heard the server sends a `wake` control message with
//! the matched transcript. Opening the duplex conversation afterwards is the
//! client's move.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use parley_core::ControlMessage;
use parley_voice::{InboundQueue, WakeCallback, WakeWordListener, pcm};
use tokio::sync::mpsc;

use super::{ConnectQuery, acquire_slot};
use crate::error::HttpError;
use crate::state::AppState;

pub async fn wake_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Result<Response, HttpError> {
    let session_key = query.session_key()?;
    let slot = acquire_slot(&state)?;

    Ok(ws.on_upgrade(move |socket| async move {
        let _slot = slot;
        tracing::info!(session = %session_key, "Wake socket opened");
        listen(socket, &state).await;
        tracing::info!(session = %session_key, "Wake socket closed");
    }))
}

async fn listen(socket: WebSocket, state: &AppState) {
    let (mut sink, mut stream) = socket.split();
    let cancel = state.shutdown.child_token();
    let frames = Arc::new(InboundQueue::new(
        "wake frames",
        state.settings.queues.inbound_frames,
    ));

    let (detected_tx, mut detected_rx) = mpsc::unbounded_channel::<String>();
    let on_wake: WakeCallback = Arc::new(move |transcript: String| {
        let _ = detected_tx.send(transcript);
    });
    let listener = WakeWordListener::new(
        &state.settings,
        state.deps.vad.as_ref(),
        Arc::clone(&state.deps.transcriber),
        on_wake,
    );
    let listener = tokio::spawn(listener.run(Arc::clone(&frames), cancel.clone()));

    // ── Writer: detections → `wake` control messages ─────────────────────
    let writer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let transcript = tokio::select! {
                    () = cancel.cancelled() => break,
                    transcript = detected_rx.recv() => transcript,
                };
                let Some(transcript) = transcript else { break };
                let message = ControlMessage::wake(transcript).to_json();
                if sink.send(Message::Text(message.into())).await.is_err() {
                    cancel.cancel();
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        })
    };

    // ── Reader: capture frames → listener ────────────────────────────────
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Binary(data))) => {
                if data.len() % 2 != 0 {
                    tracing::debug!(bytes = data.len(), "Dropping odd-length audio frame");
                    continue;
                }
                let frame = pcm::decode_pcm16_le(&data);
                if !frame.is_empty() {
                    frames.push_lossy(frame);
                }
            }
            Some(Ok(Message::Text(_) | Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Wake socket read failed");
                break;
            }
        }
    }

    cancel.cancel();
    frames.close();
    for (task, handle) in [("listener", listener), ("writer", writer)] {
        if let Err(e) = handle.await {
            tracing::warn!(task, error = %e, "Wake task ended abnormally");
        }
    }
}
