//! Transport capability: moves audio and control messages in and out of a
//! connection.
//!
//! The pipeline is written purely against [`Transport`]. Implementations:
//!
//! * [`relay::RelayTransport`]: a message-oriented gateway pushes
//!   [`RelayEnvelope`](parley_core::RelayEnvelope)s in and receives them out.
//! * `parley_axum::SocketTransport`: a direct WebSocket carrying binary PCM
//!   and JSON text frames.

pub mod relay;

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::ControlMessage;
use tokio_util::sync::CancellationToken;

use crate::error::VoiceError;
use crate::pcm::AudioContainer;
use crate::queue::StageQueue;

/// Callback receiving parsed inbound control messages.
pub type ControlHandler = Arc<dyn Fn(ControlMessage) + Send + Sync>;

/// One item on the outbound audio queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundAudio {
    pub data: Vec<u8>,
    /// `None` for raw PCM16 LE.
    pub container: Option<AudioContainer>,
    pub sample_rate: u32,
}

impl OutboundAudio {
    pub const fn pcm(data: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            data,
            container: None,
            sample_rate,
        }
    }
}

pub type InboundQueue = StageQueue<Vec<i16>>;
pub type OutboundQueue = StageQueue<OutboundAudio>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Read until cancelled or the peer goes away.
    ///
    /// Audio frames go to `inbound` (lossy), control messages to
    /// `on_control`. Malformed control input is ignored. Cancels `cancel` on
    /// exit so the rest of the connection shuts down with it.
    async fn read_pump(
        &self,
        inbound: Arc<InboundQueue>,
        on_control: ControlHandler,
        cancel: CancellationToken,
    );

    /// Send outbound audio until cancelled or `outbound` is closed.
    ///
    /// A write failure is fatal to the connection and cancels `cancel`.
    async fn write_pump(&self, outbound: Arc<OutboundQueue>, cancel: CancellationToken);

    /// Send one control message now. Safe to call from any task.
    async fn send_control(&self, message: &ControlMessage) -> Result<(), VoiceError>;

    /// Close the underlying channel. Idempotent.
    async fn close(&self);
}
