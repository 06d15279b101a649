use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// `GET /api/health` - liveness plus a summary of the pipeline setup.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "vad": state.deps.vad.name(),
        "active_connections": state.connections.active(),
        "max_connections": state.max_connections,
        "input_sample_rate": state.settings.input_sample_rate,
        "output_sample_rate": state.settings.output_sample_rate,
        "voice": state.settings.voice,
    }))
}
