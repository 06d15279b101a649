//! `GET /api/voice/relay` - gateway-relayed voice conversation.
//!
//! A messaging gateway holds one socket per conversation and exchanges JSON
//! [`RelayEnvelope`]s in text frames: base64 PCM under `audio`, plus
//! `interrupt`, `config`, `voice_start` and `voice_end`. Keep-alive is the
//! gateway's business, so no pings are sent here.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_core::RelayEnvelope;
use parley_voice::{RelayInbox, RelayOutbound, RelayTransport, VoiceError};
use tokio::sync::Mutex;

use super::{ConnectQuery, acquire_slot, run_connection};
use crate::error::HttpError;
use crate::state::AppState;

/// Outbound half of the gateway socket.
struct SocketRelayOutbound {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl RelayOutbound for SocketRelayOutbound {
    async fn send(&self, envelope: RelayEnvelope) -> Result<(), VoiceError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(envelope.to_json().into()))
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

pub async fn relay_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Result<Response, HttpError> {
    let session_key = query.session_key()?;
    let slot = acquire_slot(&state)?;

    Ok(ws.on_upgrade(move |socket| async move {
        let _slot = slot;
        tracing::info!(session = %session_key, "Relay socket opened");

        let (sink, stream) = socket.split();
        let outbound = Arc::new(SocketRelayOutbound {
            sink: Mutex::new(sink),
        });
        let (transport, inbox) = RelayTransport::new(outbound);
        let gateway = tokio::spawn(forward_envelopes(stream, inbox));

        run_connection(&state, session_key, Arc::new(transport)).await;
        gateway.abort();
    }))
}

/// Feed gateway text frames into the connection. Returning drops `inbox`,
/// which ends the conversation.
async fn forward_envelopes(mut stream: SplitStream<WebSocket>, inbox: RelayInbox) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if !inbox.deliver_json(text.as_str()) {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                tracing::debug!(bytes = data.len(), "Ignoring binary frame on relay socket");
            }
            Ok(Message::Close(_)) => {
                tracing::debug!("Gateway closed the relay socket");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Relay socket read failed");
                break;
            }
        }
    }
}
