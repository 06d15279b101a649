//! `GET /api/voice/ws` - direct-socket voice conversation.
//!
//! Binary frames carry PCM16 LE audio both ways, text frames carry JSON
//! control messages. See [`SocketTransport`] for the frame table.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;

use super::{ConnectQuery, acquire_slot, run_connection};
use crate::error::HttpError;
use crate::state::AppState;
use crate::ws_transport::SocketTransport;

pub async fn voice_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Result<Response, HttpError> {
    let session_key = query.session_key()?;
    let slot = acquire_slot(&state)?;

    Ok(ws.on_upgrade(move |socket| async move {
        let _slot = slot;
        tracing::info!(session = %session_key, "Voice socket opened");
        let transport = Arc::new(SocketTransport::new(
            socket,
            state.settings.keepalive.clone(),
        ));
        run_connection(&state, session_key, transport).await;
    }))
}
