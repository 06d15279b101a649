//! Direct-socket [`Transport`] over an axum WebSocket.
//!
//! ## Protocol
//!
//! | Direction | Frame | Content |
//! |---|---|---|
//! | Client → Server | Binary | PCM16 LE mono capture frame at the input rate (20 ms nominal) |
//! | Client → Server | Text | JSON control message (`interrupt`, `config`) |
//! | Server → Client | Binary | PCM16 LE playback frame, or a whole encoded container (WAV, MP3, ...) |
//! | Server → Client | Text | JSON control message (`state`, `transcript`, `vad_state`, `error`, `interrupt`) |
//!
//! ## Keep-alive
//!
//! The write pump sends a WebSocket ping every `ping_interval`. Any frame from
//! the client (pongs included) refreshes the liveness clock; if nothing has
//! arrived for `liveness_timeout` the connection is treated as dead and
//! cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_core::{ControlMessage, KeepAliveSettings};
use parley_voice::pcm;
use parley_voice::{ControlHandler, InboundQueue, OutboundQueue, Transport, VoiceError};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

pub struct SocketTransport {
    sink: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<Option<SplitStream<WebSocket>>>,
    keep_alive: KeepAliveSettings,
    last_seen: Mutex<Instant>,
    closed: AtomicBool,
}

impl SocketTransport {
    pub fn new(socket: WebSocket, keep_alive: KeepAliveSettings) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: tokio::sync::Mutex::new(sink),
            stream: Mutex::new(Some(stream)),
            keep_alive,
            last_seen: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
        }
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn silent_for(&self) -> std::time::Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    async fn send(&self, message: Message) -> Result<(), VoiceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VoiceError::ConnectionClosed);
        }
        self.sink
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn read_pump(
        &self,
        inbound: Arc<InboundQueue>,
        on_control: ControlHandler,
        cancel: CancellationToken,
    ) {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut stream) = stream else {
            tracing::warn!("Socket read pump already started");
            return;
        };

        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                message = stream.next() => message,
            };
            let message = match message {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    break;
                }
                None => break,
            };
            self.touch();

            match message {
                Message::Binary(data) => {
                    if data.len() % 2 != 0 {
                        tracing::debug!(bytes = data.len(), "Dropping odd-length audio frame");
                        continue;
                    }
                    let frame = pcm::decode_pcm16_le(&data);
                    if !frame.is_empty() {
                        inbound.push_lossy(frame);
                    }
                }
                Message::Text(text) => match ControlMessage::parse(text.as_str()) {
                    Some(control) => on_control(control),
                    None => tracing::debug!("Ignoring malformed control message"),
                },
                Message::Close(_) => {
                    tracing::debug!("Client closed the socket");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        cancel.cancel();
    }

    async fn write_pump(&self, outbound: Arc<OutboundQueue>, cancel: CancellationToken) {
        let period = self.keep_alive.ping_interval();
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                _ = ping.tick() => {
                    let silent = self.silent_for();
                    if silent > self.keep_alive.liveness_timeout() {
                        tracing::warn!(silent = ?silent, "Client stopped responding, closing connection");
                        cancel.cancel();
                        break;
                    }
                    Message::Ping(Vec::<u8>::new().into())
                }
                audio = outbound.recv() => match audio {
                    Some(audio) => Message::Binary(audio.data.into()),
                    None => break,
                },
            };
            if let Err(e) = self.send(message).await {
                if !cancel.is_cancelled() {
                    tracing::warn!(error = %e, "WebSocket write failed, closing connection");
                    cancel.cancel();
                }
                break;
            }
        }
    }

    async fn send_control(&self, message: &ControlMessage) -> Result<(), VoiceError> {
        self.send(Message::Text(message.to_json().into())).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}
