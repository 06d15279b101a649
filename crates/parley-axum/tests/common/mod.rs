//! Shared fixtures: canned collaborators, an in-process server on an
//! ephemeral port and a few WebSocket client helpers.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, stream};
use parley_axum::{Collaborators, CorsConfig, ServerConfig, bootstrap, serve};
use parley_core::{
    AgentRunner, CollaboratorError, ControlMessage, NoopBroadcast, SynthesisRequest, Synthesizer,
    TextStream, Transcriber,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);
pub const SILENCE: [i16; 320] = [50; 320];
pub const SPEECH: [i16; 320] = [3_000; 320];

// ── Mock collaborators ─────────────────────────────────────────────

pub struct FixedStt(pub &'static str);

#[async_trait]
impl Transcriber for FixedStt {
    async fn transcribe(
        &self,
        _samples: &[f32],
        _sample_rate: u32,
    ) -> Result<String, CollaboratorError> {
        Ok(self.0.to_owned())
    }
}

/// Records requests and returns 40 ms of silence at the requested rate.
#[derive(Default)]
pub struct RecordingTts {
    requests: Mutex<Vec<(String, String, u32)>>,
}

impl RecordingTts {
    pub fn requests(&self) -> Vec<(String, String, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for RecordingTts {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Vec<u8>, CollaboratorError> {
        self.requests.lock().unwrap().push((
            request.text.to_owned(),
            request.voice.to_owned(),
            request.sample_rate,
        ));
        Ok(vec![0; request.sample_rate as usize / 25 * 2])
    }
}

pub struct CannedAgent(pub Vec<&'static str>);

#[async_trait]
impl AgentRunner for CannedAgent {
    async fn run(
        &self,
        _session_key: &str,
        _prompt: &str,
        _channel: &str,
    ) -> Result<TextStream, CollaboratorError> {
        let fragments: Vec<String> = self.0.iter().map(|f| (*f).to_owned()).collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}

// ── Server ─────────────────────────────────────────────────────────

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub tts: Arc<RecordingTts>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }

    pub async fn connect(&self, path: &str) -> Client {
        let (client, _) = tokio_tungstenite::connect_async(self.url(path))
            .await
            .unwrap_or_else(|e| panic!("connect {path}: {e}"));
        client
    }
}

pub async fn start_server(config: ServerConfig, transcript: &'static str) -> TestServer {
    let tts = Arc::new(RecordingTts::default());
    let collaborators = Collaborators {
        transcriber: Arc::new(FixedStt(transcript)),
        synthesizer: tts.clone(),
        agent: Arc::new(CannedAgent(vec!["Hello", " there."])),
        broadcast: Some(Arc::new(NoopBroadcast)),
    };
    let shutdown = CancellationToken::new();
    let ctx = bootstrap(&config, collaborators, shutdown.clone()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve(listener, ctx, &CorsConfig::AllowAll).await.unwrap();
    });

    TestServer { addr, shutdown, tts }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        ..ServerConfig::with_defaults()
    }
}

// ── Client helpers ─────────────────────────────────────────────────

pub fn encode_pcm(frame: &[i16]) -> Vec<u8> {
    frame.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub async fn send_frames(client: &mut Client, frame: &[i16], count: usize) {
    for _ in 0..count {
        client
            .send(Message::Binary(encode_pcm(frame).into()))
            .await
            .unwrap();
    }
}

/// Calibrate the gate, speak for 300 ms, then fall silent for 600 ms.
pub async fn say_something(client: &mut Client) {
    send_frames(client, &SILENCE, 20).await;
    send_frames(client, &SPEECH, 15).await;
    send_frames(client, &SILENCE, 30).await;
}

#[derive(Debug)]
pub enum Received {
    Control(ControlMessage),
    Text(String),
    Audio(usize),
    Closed,
}

/// Next data frame from the server, skipping pings.
pub async fn next_event(client: &mut Client) -> Received {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for the server");
        match message {
            Some(Ok(Message::Text(text))) => {
                return ControlMessage::parse(text.as_str())
                    .map_or_else(|| Received::Text(text.to_string()), Received::Control);
            }
            Some(Ok(Message::Binary(data))) => return Received::Audio(data.len()),
            Some(Ok(Message::Close(_)) | Err(_)) | None => return Received::Closed,
            Some(Ok(_)) => {}
        }
    }
}

/// Next raw text frame, skipping audio and pings.
pub async fn next_text(client: &mut Client) -> String {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for the server");
        match message {
            Some(Ok(Message::Text(text))) => return text.to_string(),
            Some(Ok(Message::Close(_)) | Err(_)) | None => panic!("socket closed"),
            Some(Ok(_)) => {}
        }
    }
}

/// Next control message, skipping audio.
pub async fn next_control(client: &mut Client) -> ControlMessage {
    loop {
        match next_event(client).await {
            Received::Control(message) => return message,
            Received::Audio(_) => {}
            other => panic!("expected a control message, got {other:?}"),
        }
    }
}

/// Wait until the server closes the socket.
pub async fn wait_closed(client: &mut Client) {
    loop {
        if matches!(next_event(client).await, Received::Closed) {
            return;
        }
    }
}
