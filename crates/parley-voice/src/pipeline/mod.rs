//! Connection orchestrator.
//!
//! A [`VoiceConnection`] owns the conversation state machine, the noise gate,
//! the VAD and the four inter-stage queues of one connection, and runs five
//! tasks for its lifetime:
//!
//! | Task | Reads | Writes |
//! |------|-------|--------|
//! | transport read | peer | inbound frames, control handler |
//! | utterance loop | inbound frames | transcripts |
//! | response loop | transcripts | speakable units |
//! | speech loop | speakable units | outbound frames |
//! | transport write | outbound frames | peer |
//!
//! ## State machine
//!
//! ```text
//! Idle ─► Listening ─► Processing ─► Speaking ─► Listening
//!             ▲            │             │
//!             └────────────┘             ▼
//!          (no text / error)       Interrupting ─► Listening
//! ```
//!
//! ## Shutdown
//!
//! Cancelling the connection token is the only shutdown trigger: the queues
//! are closed, the transport is closed, and all five tasks are joined.

mod context;
mod response;
mod speech;
mod utterance;

use std::sync::Arc;

use parley_core::{
    AgentRunner, ControlKind, ControlMessage, ConversationState, Synthesizer, Transcriber,
    UiBroadcast, VoiceSettings,
};
use tokio_util::sync::CancellationToken;

use crate::transport::{ControlHandler, OutboundAudio, Transport};
use crate::vad::VadProvider;
use context::{ConnectionContext, SpeechItem};

/// Collaborators injected into every connection.
#[derive(Clone)]
pub struct ConnectionDeps {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub agent: Arc<dyn AgentRunner>,
    pub broadcast: Arc<dyn UiBroadcast>,
    pub vad: Arc<dyn VadProvider>,
}

/// One full-duplex voice conversation.
pub struct VoiceConnection {
    ctx: Arc<ConnectionContext>,
}

impl VoiceConnection {
    pub fn new(
        session_key: impl Into<String>,
        settings: VoiceSettings,
        deps: ConnectionDeps,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            ctx: Arc::new(ConnectionContext::new(
                session_key.into(),
                settings,
                deps,
                transport,
                CancellationToken::new(),
            )),
        }
    }

    pub fn session_key(&self) -> &str {
        &self.ctx.session_key
    }

    /// Current conversation state.
    pub fn state(&self) -> ConversationState {
        self.ctx.state()
    }

    /// Token whose cancellation shuts the connection down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.ctx.cancel.cancel();
    }

    /// Run the connection until it is cancelled or the peer goes away.
    pub async fn run(&self) {
        let ctx = &self.ctx;
        tracing::info!(session = %ctx.session_key, "Voice connection started");

        ctx.transition(
            &[ConversationState::Idle],
            ConversationState::Listening,
            None,
        )
        .await;

        let read = {
            let transport = Arc::clone(&ctx.transport);
            let inbound = Arc::clone(&ctx.inbound);
            let handler = control_handler(Arc::clone(ctx));
            let cancel = ctx.cancel.clone();
            tokio::spawn(async move { transport.read_pump(inbound, handler, cancel).await })
        };
        let write = {
            let transport = Arc::clone(&ctx.transport);
            let outbound = Arc::clone(&ctx.outbound);
            let cancel = ctx.cancel.clone();
            let guard = cancel.clone().drop_guard();
            tokio::spawn(async move {
                let _guard = guard;
                transport.write_pump(outbound, cancel).await;
            })
        };
        let utterance = spawn_stage(ctx, utterance::run);
        let response = spawn_stage(ctx, response::run);
        let speech = spawn_stage(ctx, speech::run);

        ctx.cancel.cancelled().await;
        tracing::debug!(session = %ctx.session_key, "Shutting down voice connection");

        ctx.close_queues();
        ctx.transport.close().await;

        for (task, handle) in [
            ("read", read),
            ("write", write),
            ("utterance", utterance),
            ("response", response),
            ("speech", speech),
        ] {
            if let Err(e) = handle.await {
                tracing::warn!(task, error = %e, "Pipeline task ended abnormally");
            }
        }

        ctx.force_state(ConversationState::Idle);
        tracing::info!(session = %ctx.session_key, "Voice connection closed");
    }

    /// Barge-in. Only acts while `Speaking`; returns whether it did.
    pub async fn interrupt(&self) -> bool {
        self.ctx.interrupt().await
    }

    /// Speakable units waiting for synthesis.
    pub fn queued_units(&self) -> usize {
        self.ctx.units.len()
    }

    /// Outbound frames waiting for the transport.
    pub fn queued_audio(&self) -> usize {
        self.ctx.outbound.len()
    }

    /// Put the state machine into `state` without emitting anything.
    #[doc(hidden)]
    pub fn force_state_for_test(&self, state: ConversationState) {
        self.ctx.force_state(state);
    }

    /// Queue speech and audio as if a response were mid-playback.
    #[doc(hidden)]
    pub async fn queue_playback_for_test(&self, units: &[&str], frames: usize) {
        let epoch = self.ctx.epoch();
        for text in units {
            let item = SpeechItem::Unit {
                epoch,
                text: (*text).to_owned(),
            };
            let _ = self.ctx.units.push(item).await;
        }
        for _ in 0..frames {
            self.ctx
                .outbound
                .push_lossy(OutboundAudio::pcm(vec![0; 640], 16_000));
        }
    }
}

/// Spawn a stage loop that cancels the whole connection when it exits, even
/// by panic.
fn spawn_stage<F, Fut>(ctx: &Arc<ConnectionContext>, stage: F) -> tokio::task::JoinHandle<()>
where
    F: FnOnce(Arc<ConnectionContext>) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let guard = ctx.cancel.clone().drop_guard();
    let fut = stage(Arc::clone(ctx));
    tokio::spawn(async move {
        let _guard = guard;
        fut.await;
    })
}

/// Route client control messages: `interrupt` triggers barge-in, `config`
/// updates the output voice / sample rate.
fn control_handler(ctx: Arc<ConnectionContext>) -> ControlHandler {
    Arc::new(move |message: ControlMessage| match message.kind {
        ControlKind::Interrupt => {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                ctx.interrupt().await;
            });
        }
        ControlKind::Config => ctx.apply_config(message.sample_rate, message.voice),
        other => tracing::debug!(kind = ?other, "Ignoring client control message"),
    })
}
