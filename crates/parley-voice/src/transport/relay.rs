//! Relayed transport: a gateway delivers tagged envelopes asynchronously and
//! receives outbound audio/control wrapped in the same envelope format.
//!
//! ## Envelope mapping
//!
//! Inbound: `audio` → PCM frame on the inbound queue; `interrupt` and
//! `config` → control handler; `voice_start` / `voice_end` are gateway hints
//! and only logged (the pipeline runs its own VAD).
//!
//! Outbound:
//!
//! | Control message | Envelope |
//! |-----------------|----------|
//! | `state` entering speaking | `voice_start` |
//! | `state` leaving speaking | `voice_end` |
//! | other `state` | `config` with `state` |
//! | `interrupt` | `interrupt` |
//! | `transcript` | `config` with `text`, `final: true` |
//! | `error` | `config` with `error` |
//! | `vad_state` | `config` with `speaking` (user voice activity) |
//! | `config` / `wake` | `config` with the same fields |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parley_core::{ControlKind, ControlMessage, ConversationState, RelayEnvelope, RelayKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ControlHandler, InboundQueue, OutboundAudio, OutboundQueue, Transport};
use crate::error::VoiceError;
use crate::pcm::{self, PCM_ENCODING};

/// Outbound side of the gateway.
#[async_trait]
pub trait RelayOutbound: Send + Sync {
    async fn send(&self, envelope: RelayEnvelope) -> Result<(), VoiceError>;

    /// Release the gateway channel. Default: nothing to release.
    async fn close(&self) {}
}

/// Handle the gateway uses to push inbound envelopes.
#[derive(Debug, Clone)]
pub struct RelayInbox {
    tx: mpsc::UnboundedSender<RelayEnvelope>,
}

impl RelayInbox {
    /// Deliver one envelope. Returns `false` once the connection is gone.
    pub fn deliver(&self, envelope: RelayEnvelope) -> bool {
        self.tx.send(envelope).is_ok()
    }

    /// Parse and deliver a JSON envelope. Malformed input is dropped.
    pub fn deliver_json(&self, text: &str) -> bool {
        match RelayEnvelope::parse(text) {
            Some(envelope) => self.deliver(envelope),
            None => {
                tracing::debug!("Ignoring malformed relay envelope");
                !self.tx.is_closed()
            }
        }
    }
}

pub struct RelayTransport {
    inbox: Mutex<Option<mpsc::UnboundedReceiver<RelayEnvelope>>>,
    outbound: Arc<dyn RelayOutbound>,
    agent_speaking: AtomicBool,
    closed: AtomicBool,
}

impl RelayTransport {
    pub fn new(outbound: Arc<dyn RelayOutbound>) -> (Self, RelayInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            inbox: Mutex::new(Some(rx)),
            outbound,
            agent_speaking: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };
        (transport, RelayInbox { tx })
    }

    fn handle_inbound(envelope: RelayEnvelope, inbound: &InboundQueue, on_control: &ControlHandler) {
        match envelope.kind {
            Some(RelayKind::Audio) => {
                let Some(data) = envelope.data.as_deref() else {
                    return;
                };
                match BASE64.decode(data) {
                    Ok(bytes) => {
                        let samples = pcm::decode_pcm16_le(&bytes);
                        let frame = match envelope.channels {
                            Some(channels) if channels > 1 => downmix(&samples, channels),
                            _ => samples,
                        };
                        if !frame.is_empty() {
                            inbound.push_lossy(frame);
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "Dropping relay audio with bad base64"),
                }
            }
            Some(RelayKind::Interrupt) => on_control(ControlMessage::interrupt()),
            Some(RelayKind::Config) => {
                on_control(ControlMessage::config(envelope.sample_rate, envelope.voice));
            }
            Some(kind @ (RelayKind::VoiceStart | RelayKind::VoiceEnd)) => {
                tracing::debug!(?kind, "Gateway voice activity hint");
            }
            None => {}
        }
    }

    fn envelope_for(&self, message: &ControlMessage) -> RelayEnvelope {
        match message.kind {
            ControlKind::State => {
                let state = message.state;
                let entering = state == Some(ConversationState::Speaking);
                let was_speaking = self.agent_speaking.swap(entering, Ordering::SeqCst);
                let kind = match (was_speaking, entering) {
                    (false, true) => RelayKind::VoiceStart,
                    (true, false) => RelayKind::VoiceEnd,
                    _ => RelayKind::Config,
                };
                RelayEnvelope {
                    state,
                    speaking: matches!(kind, RelayKind::VoiceStart | RelayKind::VoiceEnd)
                        .then_some(entering),
                    ..RelayEnvelope::new(kind)
                }
            }
            ControlKind::Interrupt => RelayEnvelope::new(RelayKind::Interrupt),
            ControlKind::Transcript => RelayEnvelope {
                text: message.text.clone(),
                is_final: Some(true),
                ..RelayEnvelope::new(RelayKind::Config)
            },
            ControlKind::Error => RelayEnvelope {
                error: message.text.clone(),
                ..RelayEnvelope::new(RelayKind::Config)
            },
            ControlKind::VadState => RelayEnvelope {
                speaking: message.is_speech,
                ..RelayEnvelope::new(RelayKind::Config)
            },
            ControlKind::Config | ControlKind::Wake => RelayEnvelope {
                text: message.text.clone(),
                sample_rate: message.sample_rate,
                voice: message.voice.clone(),
                ..RelayEnvelope::new(RelayKind::Config)
            },
        }
    }
}

/// Average interleaved channels into mono.
fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    samples
        .chunks_exact(usize::from(channels))
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            i16::try_from(sum / i32::from(channels)).unwrap_or_default()
        })
        .collect()
}

fn audio_envelope(audio: OutboundAudio) -> RelayEnvelope {
    let encoding = audio
        .container
        .map_or(PCM_ENCODING, pcm::AudioContainer::encoding);
    RelayEnvelope {
        data: Some(BASE64.encode(&audio.data)),
        sample_rate: Some(audio.sample_rate),
        channels: Some(1),
        encoding: Some(encoding.to_owned()),
        ..RelayEnvelope::new(RelayKind::Audio)
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn read_pump(
        &self,
        inbound: Arc<InboundQueue>,
        on_control: ControlHandler,
        cancel: CancellationToken,
    ) {
        let receiver = self
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut receiver) = receiver else {
            tracing::warn!("Relay read pump already started");
            return;
        };

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                envelope = receiver.recv() => match envelope {
                    Some(envelope) => Self::handle_inbound(envelope, &inbound, &on_control),
                    None => {
                        tracing::debug!("Relay gateway closed the inbox");
                        break;
                    }
                },
            }
        }
        cancel.cancel();
    }

    async fn write_pump(&self, outbound: Arc<OutboundQueue>, cancel: CancellationToken) {
        loop {
            let audio = tokio::select! {
                () = cancel.cancelled() => break,
                audio = outbound.recv() => audio,
            };
            let Some(audio) = audio else { break };
            if let Err(e) = self.outbound.send(audio_envelope(audio)).await {
                tracing::warn!(error = %e, "Relay audio send failed, closing connection");
                cancel.cancel();
                break;
            }
        }
    }

    async fn send_control(&self, message: &ControlMessage) -> Result<(), VoiceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VoiceError::ConnectionClosed);
        }
        self.outbound.send(self.envelope_for(message)).await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.outbound.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct Captured {
        sent: tokio::sync::Mutex<Vec<RelayEnvelope>>,
    }

    #[async_trait]
    impl RelayOutbound for Captured {
        async fn send(&self, envelope: RelayEnvelope) -> Result<(), VoiceError> {
            self.sent.lock().await.push(envelope);
            Ok(())
        }
    }

    fn transport() -> (RelayTransport, RelayInbox, Arc<Captured>) {
        let sink = Arc::new(Captured::default());
        let (transport, inbox) = RelayTransport::new(sink.clone());
        (transport, inbox, sink)
    }

    #[tokio::test]
    async fn inbound_audio_and_control_are_routed() {
        let (transport, inbox, _) = transport();
        let inbound = Arc::new(InboundQueue::new("inbound", 10));
        let controls = Arc::new(std::sync::Mutex::new(Vec::<ControlMessage>::new()));
        let handler: ControlHandler = {
            let controls = controls.clone();
            Arc::new(move |msg: ControlMessage| controls.lock().unwrap().push(msg))
        };
        let cancel = CancellationToken::new();

        let pcm = pcm::encode_pcm16_le(&[100, -100, 300]);
        inbox.deliver(RelayEnvelope {
            data: Some(BASE64.encode(pcm)),
            ..RelayEnvelope::new(RelayKind::Audio)
        });
        inbox.deliver_json(r#"{"type":"config","voice":"af_bella","sample_rate":22050}"#);
        inbox.deliver_json(r#"{"type":"interrupt"}"#);
        inbox.deliver_json("garbage");
        inbox.deliver(RelayEnvelope::new(RelayKind::VoiceStart));
        drop(inbox);

        transport.read_pump(inbound.clone(), handler, cancel.clone()).await;

        assert!(cancel.is_cancelled(), "read pump must cancel on exit");
        assert_eq!(inbound.try_recv(), Some(vec![100, -100, 300]));
        let controls = controls.lock().unwrap();
        assert_eq!(controls.len(), 2);
        assert_eq!(controls[0], ControlMessage::config(Some(22050), Some("af_bella".into())));
        assert_eq!(controls[1], ControlMessage::interrupt());
    }

    #[tokio::test]
    async fn stereo_audio_is_downmixed() {
        let (transport, inbox, _) = transport();
        let inbound = Arc::new(InboundQueue::new("inbound", 10));
        inbox.deliver(RelayEnvelope {
            data: Some(BASE64.encode(pcm::encode_pcm16_le(&[100, 300, -50, -150]))),
            channels: Some(2),
            ..RelayEnvelope::new(RelayKind::Audio)
        });
        drop(inbox);
        transport
            .read_pump(inbound.clone(), Arc::new(|_: ControlMessage| {}), CancellationToken::new())
            .await;
        assert_eq!(inbound.try_recv(), Some(vec![200, -100]));
    }

    #[tokio::test]
    async fn speaking_state_maps_to_voice_start_and_end() {
        let (transport, _inbox, sink) = transport();
        for state in [
            ConversationState::Processing,
            ConversationState::Speaking,
            ConversationState::Speaking,
            ConversationState::Listening,
        ] {
            transport
                .send_control(&ControlMessage::state(state))
                .await
                .unwrap();
        }
        let kinds: Vec<_> = sink.sent.lock().await.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                Some(RelayKind::Config),
                Some(RelayKind::VoiceStart),
                Some(RelayKind::Config),
                Some(RelayKind::VoiceEnd),
            ]
        );
    }

    #[tokio::test]
    async fn transcript_and_error_use_config_envelope() {
        let (transport, _inbox, sink) = transport();
        transport
            .send_control(&ControlMessage::transcript("hello"))
            .await
            .unwrap();
        transport
            .send_control(&ControlMessage::error("boom"))
            .await
            .unwrap();
        transport.send_control(&ControlMessage::interrupt()).await.unwrap();

        let sent = sink.sent.lock().await;
        assert_eq!(sent[0].to_json(), r#"{"type":"config","text":"hello","final":true}"#);
        assert_eq!(sent[1].error.as_deref(), Some("boom"));
        assert_eq!(sent[2].kind, Some(RelayKind::Interrupt));
    }

    #[tokio::test]
    async fn write_pump_wraps_audio_in_envelopes() {
        let (transport, _inbox, sink) = transport();
        let outbound = Arc::new(OutboundQueue::new("outbound", 10));
        outbound.push_lossy(OutboundAudio::pcm(vec![1, 0, 2, 0], 24_000));
        outbound.push_lossy(OutboundAudio {
            data: b"RIFF....".to_vec(),
            container: Some(pcm::AudioContainer::Wav),
            sample_rate: 24_000,
        });
        outbound.close();

        tokio::time::timeout(
            Duration::from_secs(1),
            transport.write_pump(outbound, CancellationToken::new()),
        )
        .await
        .unwrap();

        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].encoding.as_deref(), Some("pcm_s16le"));
        assert_eq!(sent[0].data.as_deref(), Some("AQACAA=="));
        assert_eq!(sent[1].encoding.as_deref(), Some("wav"));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (transport, _inbox, _) = transport();
        transport.close().await;
        transport.close().await;
        assert!(matches!(
            transport.send_control(&ControlMessage::interrupt()).await,
            Err(VoiceError::ConnectionClosed)
        ));
    }
}
