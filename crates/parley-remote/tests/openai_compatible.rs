//! Integration tests against an in-process OpenAI-compatible mock server.

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use futures_util::StreamExt;
use parley_core::{CollaboratorError, SynthesisRequest};
use parley_remote::{RemoteConfig, RemoteEndpoint};
use serde_json::{Value, json};

#[derive(Default)]
struct Recorded {
    auth: Vec<Option<String>>,
    upload_sizes: Vec<usize>,
    chat_message_counts: Vec<usize>,
    chat_users: Vec<String>,
}

type Shared = Arc<Mutex<Recorded>>;

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

async fn transcriptions(
    State(rec): State<Shared>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let mut rec = rec.lock().unwrap();
    rec.auth.push(bearer(&headers));
    rec.upload_sizes.push(body.len());
    let has_wav = body.windows(4).any(|w| w == b"RIFF");
    Json(json!({ "text": if has_wav { "  hello world " } else { "" } }))
}

async fn speech(Json(request): Json<Value>) -> impl IntoResponse {
    if request["voice"] == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "voice exploded").into_response();
    }
    assert_eq!(request["response_format"], "pcm");
    vec![1u8, 0, 2, 0].into_response()
}

async fn chat(State(rec): State<Shared>, Json(request): Json<Value>) -> impl IntoResponse {
    {
        let mut rec = rec.lock().unwrap();
        rec.chat_message_counts
            .push(request["messages"].as_array().map_or(0, Vec::len));
        rec.chat_users
            .push(request["user"].as_str().unwrap_or_default().to_owned());
    }
    assert_eq!(request["stream"], true);
    let body = [
        r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":" there."}}]}"#,
        "data: [DONE]",
    ]
    .map(|line| format!("{line}\n\n"))
    .concat();
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

async fn start_mock() -> (String, Shared) {
    let recorded = Shared::default();
    let app = Router::new()
        .route("/v1/audio/transcriptions", post(transcriptions))
        .route("/v1/audio/speech", post(speech))
        .route("/v1/chat/completions", post(chat))
        .with_state(Arc::clone(&recorded));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1"), recorded)
}

fn config_for(base_url: &str) -> RemoteConfig {
    let endpoint = |model: &str| RemoteEndpoint {
        base_url: base_url.to_owned(),
        api_key: Some("secret".into()),
        model: model.to_owned(),
    };
    RemoteConfig {
        transcription: endpoint("whisper-1"),
        speech: endpoint("kokoro"),
        chat: endpoint("test-model"),
        ..RemoteConfig::default()
    }
}

#[tokio::test]
async fn transcription_uploads_wav_and_trims_text() {
    let (base, recorded) = start_mock().await;
    let remote = config_for(&base).build().unwrap();

    let text = remote
        .transcriber
        .transcribe(&[0.1; 1_600], 16_000)
        .await
        .unwrap();
    assert_eq!(text, "hello world");

    let rec = recorded.lock().unwrap();
    assert_eq!(rec.auth, vec![Some("Bearer secret".to_owned())]);
    // multipart framing + 44-byte header + 3200 bytes of samples
    assert!(rec.upload_sizes[0] > 3_244);
}

#[tokio::test]
async fn empty_audio_skips_the_request() {
    let (base, recorded) = start_mock().await;
    let remote = config_for(&base).build().unwrap();

    assert_eq!(remote.transcriber.transcribe(&[], 16_000).await.unwrap(), "");
    assert!(recorded.lock().unwrap().upload_sizes.is_empty());
}

#[tokio::test]
async fn speech_returns_raw_bytes_and_maps_upstream_errors() {
    let (base, _) = start_mock().await;
    let remote = config_for(&base).build().unwrap();

    let audio = remote
        .synthesizer
        .synthesize(SynthesisRequest {
            text: "Hi.",
            voice: "af_sarah",
            sample_rate: 24_000,
        })
        .await
        .unwrap();
    assert_eq!(audio, vec![1, 0, 2, 0]);

    let err = remote
        .synthesizer
        .synthesize(SynthesisRequest {
            text: "Hi.",
            voice: "broken",
            sample_rate: 24_000,
        })
        .await
        .unwrap_err();
    match err {
        CollaboratorError::Upstream { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "voice exploded");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn chat_streams_fragments_and_remembers_the_session() {
    let (base, recorded) = start_mock().await;
    let remote = config_for(&base).build().unwrap();

    let first: Vec<String> = remote
        .agent
        .run("session-1", "Say hello", "voice")
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(first, vec!["Hello", " there."]);

    let _: Vec<String> = remote
        .agent
        .run("session-1", "Again", "voice")
        .await
        .unwrap()
        .collect()
        .await;
    let _: Vec<String> = remote
        .agent
        .run("session-2", "Hi", "voice")
        .await
        .unwrap()
        .collect()
        .await;

    let rec = recorded.lock().unwrap();
    // system + user, then system + remembered turn + user, then a fresh session
    assert_eq!(rec.chat_message_counts, vec![2, 4, 2]);
    assert_eq!(rec.chat_users[0], "voice:session-1");
}

#[tokio::test]
async fn unreachable_server_is_unavailable() {
    let remote = config_for("http://127.0.0.1:1/v1").build().unwrap();
    let err = remote
        .transcriber
        .transcribe(&[0.0; 160], 16_000)
        .await
        .unwrap_err();
    assert!(matches!(err, CollaboratorError::Unavailable(_)), "{err:?}");
}
