//! Route wiring, health reporting and socket admission.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use parley_axum::{Collaborators, CorsConfig, ServerConfig, bootstrap, create_router};
use parley_core::{ConversationState, VoiceSettings};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use common::{CannedAgent, FixedStt, RecordingTts, next_control, start_server, test_config};

fn collaborators() -> Collaborators {
    Collaborators {
        transcriber: Arc::new(FixedStt("unused")),
        synthesizer: Arc::new(RecordingTts::default()),
        agent: Arc::new(CannedAgent(vec![])),
        broadcast: None,
    }
}

fn router() -> axum::Router {
    let ctx = bootstrap(&test_config(), collaborators(), CancellationToken::new()).unwrap();
    create_router(ctx, &CorsConfig::AllowAll)
}

async fn parse_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap_or_else(|e| panic!("Expected valid JSON body: {e}"))
}

async fn connect_status(url: String) -> StatusCode {
    match tokio_tungstenite::connect_async(url).await {
        Ok(_) => StatusCode::SWITCHING_PROTOCOLS,
        Err(tungstenite::Error::Http(response)) => {
            StatusCode::from_u16(response.status().as_u16()).unwrap()
        }
        Err(e) => panic!("unexpected connect error: {e}"),
    }
}

// ── GET /api/health ────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_pipeline_setup() {
    let response = router()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = parse_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["vad"], "energy");
    assert_eq!(json["active_connections"], 0);
    assert_eq!(json["input_sample_rate"], 16_000);
    assert_eq!(json["output_sample_rate"], 24_000);
}

#[tokio::test]
async fn unknown_routes_are_404() {
    let response = router()
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn invalid_settings_fail_bootstrap() {
    let config = ServerConfig {
        settings: VoiceSettings {
            input_sample_rate: 1_000,
            ..VoiceSettings::default()
        },
        ..test_config()
    };
    let err = bootstrap(&config, collaborators(), CancellationToken::new())
        .err()
        .expect("bootstrap should reject the sample rate");
    assert!(format!("{err:#}").contains("1000"), "{err:#}");
}

// ── Socket admission ───────────────────────────────────────────────

#[tokio::test]
async fn invalid_session_key_is_rejected_before_upgrade() {
    let server = start_server(test_config(), "unused").await;
    for path in ["/api/voice/ws", "/api/voice/relay", "/api/voice/wake"] {
        let status = connect_status(server.url(&format!("{path}?session=no%20spaces"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
    }
}

#[tokio::test]
async fn connection_limit_refuses_extra_sockets() {
    let config = ServerConfig {
        max_connections: 1,
        ..test_config()
    };
    let server = start_server(config, "unused").await;

    let mut first = server.connect("/api/voice/ws").await;
    assert_eq!(
        next_control(&mut first).await.state,
        Some(ConversationState::Listening)
    );

    let status = connect_status(server.url("/api/voice/wake")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
