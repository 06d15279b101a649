//! State shared by the tasks of one connection.
//!
//! Locking rules:
//!
//! * `turn` (state + epoch) is the only business value written by more than
//!   one task. Writers only ever apply the transitions of the state machine.
//! * `emit_order` serializes transitions with the `state` messages they
//!   produce, so the client always observes transitions in the order they
//!   happened. It is taken before `turn` and never while holding it.
//! * `pending_responses` counts transcripts whose response cycle has not
//!   finished queueing. It only changes under `emit_order`, so the return to
//!   `Listening` cannot race a newly accepted transcript.
//! * `gate` and `vad` are held only for one classification; never across an
//!   await and never while calling [`ConnectionContext::interrupt`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use parley_core::{ControlMessage, ConversationState, VoiceSettings};
use tokio_util::sync::CancellationToken;

use super::ConnectionDeps;
use crate::gate::NoiseGate;
use crate::queue::StageQueue;
use crate::transport::{InboundQueue, OutboundAudio, OutboundQueue, Transport};
use crate::vad::VoiceActivityDetector;

/// Authoritative state plus the response epoch.
///
/// The epoch advances on every interruption. Work tagged with an older epoch
/// belongs to a response the user already talked over and must not be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Turn {
    pub state: ConversationState,
    pub epoch: u64,
}

/// Item on the speakable-unit queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SpeechItem {
    Unit { epoch: u64, text: String },
    /// Last unit of a response cycle has been queued.
    EndOfResponse { epoch: u64 },
}

/// Runtime-adjustable output configuration.
#[derive(Debug, Clone)]
pub(crate) struct OutputConfig {
    pub voice: String,
    pub sample_rate: u32,
}

pub(crate) struct ConnectionContext {
    pub session_key: String,
    pub settings: VoiceSettings,
    pub deps: ConnectionDeps,
    pub transport: Arc<dyn Transport>,
    pub cancel: CancellationToken,

    turn: RwLock<Turn>,
    emit_order: tokio::sync::Mutex<()>,
    pending_responses: AtomicUsize,
    interrupted: tokio::sync::Notify,
    gate: Mutex<NoiseGate>,
    vad: Mutex<Box<dyn VoiceActivityDetector>>,
    output: RwLock<OutputConfig>,

    pub inbound: Arc<InboundQueue>,
    pub transcripts: StageQueue<String>,
    pub units: StageQueue<SpeechItem>,
    pub outbound: Arc<OutboundQueue>,
}

impl ConnectionContext {
    pub fn new(
        session_key: String,
        settings: VoiceSettings,
        deps: ConnectionDeps,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Self {
        let queues = &settings.queues;
        let inbound = Arc::new(StageQueue::new("inbound", queues.inbound_frames));
        let transcripts = StageQueue::new("transcripts", queues.transcripts);
        let units = StageQueue::new("units", queues.units);
        let outbound = Arc::new(StageQueue::new("outbound", queues.outbound_frames));
        let gate = Mutex::new(NoiseGate::new(&settings.gate));
        let vad = Mutex::new(deps.vad.create());
        let output = RwLock::new(OutputConfig {
            voice: settings.voice.clone(),
            sample_rate: settings.output_sample_rate,
        });

        Self {
            session_key,
            settings,
            deps,
            transport,
            cancel,
            turn: RwLock::new(Turn {
                state: ConversationState::Idle,
                epoch: 0,
            }),
            emit_order: tokio::sync::Mutex::new(()),
            pending_responses: AtomicUsize::new(0),
            interrupted: tokio::sync::Notify::new(),
            gate,
            vad,
            output,
            inbound,
            transcripts,
            units,
            outbound,
        }
    }

    // ── Locks ──────────────────────────────────────────────────────

    fn turn_read(&self) -> RwLockReadGuard<'_, Turn> {
        self.turn.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn turn_write(&self) -> RwLockWriteGuard<'_, Turn> {
        self.turn.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn gate(&self) -> MutexGuard<'_, NoiseGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn vad(&self) -> MutexGuard<'_, Box<dyn VoiceActivityDetector>> {
        self.vad.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── State machine ──────────────────────────────────────────────

    pub fn state(&self) -> ConversationState {
        self.turn_read().state
    }

    pub fn epoch(&self) -> u64 {
        self.turn_read().epoch
    }

    /// Move to `to` if the current state is in `from` (and, when given, the
    /// epoch still matches). Emits a `state` message on change.
    pub async fn transition(
        &self,
        from: &[ConversationState],
        to: ConversationState,
        epoch: Option<u64>,
    ) -> bool {
        let _order = self.emit_order.lock().await;
        let changed = {
            let mut turn = self.turn_write();
            let epoch_ok = epoch.is_none_or(|e| e == turn.epoch);
            if epoch_ok && from.contains(&turn.state) && turn.state.can_transition_to(to) {
                tracing::debug!(old = %turn.state, new = %to, "Conversation state transition");
                turn.state = to;
                true
            } else {
                false
            }
        };
        if changed {
            self.send(ControlMessage::state(to)).await;
        }
        changed
    }

    /// Register a transcript about to be queued for the response loop and
    /// leave `Listening` if we are still there.
    pub async fn accept_transcript(&self) {
        let _order = self.emit_order.lock().await;
        self.pending_responses.fetch_add(1, Ordering::SeqCst);
        let entered = {
            let mut turn = self.turn_write();
            if turn.state == ConversationState::Listening {
                tracing::debug!(old = %turn.state, new = "processing", "Conversation state transition");
                turn.state = ConversationState::Processing;
                true
            } else {
                false
            }
        };
        if entered {
            self.send(ControlMessage::state(ConversationState::Processing)).await;
        }
    }

    /// The response loop is done queueing units for one transcript.
    pub fn response_finished(&self) {
        let _ = self
            .pending_responses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Return to `Listening` after a response of `epoch`, unless speech is
    /// still queued or another transcript is waiting for its response.
    pub async fn resume_listening(&self, epoch: u64) -> bool {
        let _order = self.emit_order.lock().await;
        let resumed = {
            let mut turn = self.turn_write();
            let busy = self.pending_responses.load(Ordering::SeqCst) > 0 || !self.units.is_empty();
            if busy {
                tracing::debug!(state = %turn.state, "More speech on its way, not resuming listening");
                false
            } else if turn.epoch == epoch
                && matches!(
                    turn.state,
                    ConversationState::Speaking | ConversationState::Processing
                )
            {
                tracing::debug!(old = %turn.state, new = "listening", "Conversation state transition");
                turn.state = ConversationState::Listening;
                true
            } else {
                false
            }
        };
        if resumed {
            self.send(ControlMessage::state(ConversationState::Listening)).await;
        }
        resumed
    }

    /// Enter `Speaking` for a unit of `epoch`.
    ///
    /// Returns `false` when the unit is stale or the state does not allow
    /// speaking (the unit must then be skipped).
    pub async fn begin_speaking(&self, epoch: u64) -> bool {
        let _order = self.emit_order.lock().await;
        let entered = {
            let mut turn = self.turn_write();
            if turn.epoch != epoch {
                return false;
            }
            match turn.state {
                ConversationState::Speaking => return true,
                ConversationState::Processing => {
                    tracing::debug!(old = %turn.state, new = "speaking", "Conversation state transition");
                    turn.state = ConversationState::Speaking;
                    true
                }
                _ => return false,
            }
        };
        if entered {
            self.send(ControlMessage::state(ConversationState::Speaking)).await;
        }
        entered
    }

    /// Barge-in: stop speaking, discard pending speech and audio, reset the
    /// VAD and resume listening.
    ///
    /// Only acts while `Speaking`. The whole sequence runs under the state
    /// write lock, so the speech loop cannot emit a frame between the drain
    /// and the return to `Listening`.
    pub async fn interrupt(&self) -> bool {
        let _order = self.emit_order.lock().await;
        let (units, frames) = {
            let mut turn = self.turn_write();
            if turn.state != ConversationState::Speaking {
                return false;
            }
            turn.state = ConversationState::Interrupting;
            turn.epoch += 1;
            let units = self.units.drain();
            let frames = self.outbound.drain();
            self.vad().reset();
            turn.state = ConversationState::Listening;
            (units, frames)
        };
        self.interrupted.notify_waiters();
        tracing::info!(
            session = %self.session_key,
            dropped_units = units,
            dropped_frames = frames,
            "Interrupted, listening"
        );
        self.send(ControlMessage::state(ConversationState::Interrupting))
            .await;
        self.send(ControlMessage::interrupt()).await;
        self.send(ControlMessage::state(ConversationState::Listening))
            .await;
        true
    }

    /// Resolves once an interruption has moved past `epoch`.
    pub async fn superseded(&self, epoch: u64) {
        loop {
            let interrupted = self.interrupted.notified();
            if self.epoch() != epoch {
                return;
            }
            interrupted.await;
        }
    }

    /// Queue one outbound frame if `epoch` is still being spoken.
    ///
    /// Checked under the state read lock, so an interruption either happens
    /// entirely before (frame refused) or entirely after (frame drained).
    pub fn push_frame_if_current(&self, epoch: u64, audio: OutboundAudio) -> bool {
        let turn = self.turn_read();
        if turn.state != ConversationState::Speaking || turn.epoch != epoch {
            return false;
        }
        self.outbound.push_lossy(audio)
    }

    #[doc(hidden)]
    pub fn force_state(&self, state: ConversationState) {
        self.turn_write().state = state;
    }

    // ── Output configuration ───────────────────────────────────────

    pub fn output(&self) -> OutputConfig {
        self.output
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a client `config` message. Invalid values are ignored.
    pub fn apply_config(&self, sample_rate: Option<u32>, voice: Option<String>) {
        let mut output = self.output.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(rate) = sample_rate {
            if (8_000..=192_000).contains(&rate) {
                output.sample_rate = rate;
            } else {
                tracing::debug!(rate, "Ignoring out-of-range output sample rate");
            }
        }
        if let Some(voice) = voice.filter(|v| !v.trim().is_empty()) {
            output.voice = voice;
        }
        tracing::debug!(voice = %output.voice, sample_rate = output.sample_rate, "Output config updated");
    }

    // ── Messaging ──────────────────────────────────────────────────

    /// Send a control message. A transport failure is fatal to the connection.
    pub async fn send(&self, message: ControlMessage) {
        if let Err(e) = self.transport.send_control(&message).await {
            if !self.cancel.is_cancelled() {
                tracing::warn!(error = %e, "Control send failed, closing connection");
                self.cancel.cancel();
            }
        }
    }

    pub fn close_queues(&self) {
        self.inbound.close();
        self.transcripts.close();
        self.units.close();
        self.outbound.close();
    }
}
