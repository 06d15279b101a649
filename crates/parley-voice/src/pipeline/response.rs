//! Response loop (LLM stage): transcript → agent stream → speakable units.

use std::sync::Arc;

use futures_util::StreamExt;
use parley_core::{ControlMessage, ConversationState, UiEvent};
use tokio::time::{Instant, sleep_until};

use super::context::{ConnectionContext, SpeechItem};
use crate::markdown::{ReasoningFilter, clean_for_speech};
use crate::segmenter::Segmenter;

pub(crate) async fn run(ctx: Arc<ConnectionContext>) {
    loop {
        let transcript = tokio::select! {
            () = ctx.cancel.cancelled() => break,
            transcript = ctx.transcripts.recv() => transcript,
        };
        let Some(transcript) = transcript else { break };

        let outcome = respond(&ctx, &transcript).await;
        ctx.response_finished();
        match outcome {
            Outcome::Shutdown => break,
            Outcome::Superseded => {}
            Outcome::Silent { epoch } => {
                ctx.resume_listening(epoch).await;
            }
            Outcome::Spoken { epoch } => {
                if ctx.units.push(SpeechItem::EndOfResponse { epoch }).await.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(session = %ctx.session_key, "Response loop stopped");
}

/// How a response cycle ended.
enum Outcome {
    /// At least one unit was queued for `epoch`.
    Spoken { epoch: u64 },
    /// Nothing to say (agent failure or no speakable text).
    Silent { epoch: u64 },
    /// An interruption moved the conversation on.
    Superseded,
    Shutdown,
}

impl Outcome {
    fn abandoned(ctx: &ConnectionContext) -> Self {
        if ctx.cancel.is_cancelled() {
            Self::Shutdown
        } else {
            Self::Superseded
        }
    }
}

/// Outcome of queueing one unit.
enum Queued {
    Yes,
    Empty,
    /// Response superseded by an interruption, or connection shutting down.
    Abandon,
}

struct Cycle<'a> {
    ctx: &'a ConnectionContext,
    epoch: u64,
    queued: usize,
}

impl Cycle<'_> {
    async fn enqueue(&mut self, unit: &str) -> Queued {
        let text = clean_for_speech(unit);
        if text.is_empty() {
            return Queued::Empty;
        }
        if self.ctx.epoch() != self.epoch {
            return Queued::Abandon;
        }
        tracing::debug!(unit = %text, "Speakable unit ready");
        let item = SpeechItem::Unit {
            epoch: self.epoch,
            text,
        };
        if self.ctx.units.push(item).await.is_err() {
            return Queued::Abandon;
        }
        self.queued += 1;
        Queued::Yes
    }

    async fn enqueue_all(&mut self, units: Vec<String>) -> bool {
        for unit in units {
            if matches!(self.enqueue(&unit).await, Queued::Abandon) {
                return false;
            }
        }
        true
    }
}

/// Run one response cycle.
async fn respond(ctx: &ConnectionContext, transcript: &str) -> Outcome {
    // An interruption may have put us back in `Listening` while this
    // transcript was queued.
    ctx.transition(
        &[ConversationState::Listening],
        ConversationState::Processing,
        None,
    )
    .await;
    let epoch = ctx.epoch();
    let session_key = ctx.session_key.as_str();

    let mut stream = match ctx
        .deps
        .agent
        .run(session_key, transcript, &ctx.settings.channel)
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Agent runner failed");
            ctx.send(ControlMessage::error(format!("Agent failed: {e}")))
                .await;
            return Outcome::Silent { epoch };
        }
    };

    let mut segmenter = Segmenter::new(&ctx.settings.segmenter);
    let mut filter = ReasoningFilter::new();
    let mut cycle = Cycle {
        ctx,
        epoch,
        queued: 0,
    };
    let mut deadline: Option<Instant> = None;

    loop {
        let flush_timer = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = ctx.cancel.cancelled() => return Outcome::Shutdown,
            () = ctx.superseded(epoch) => {
                tracing::debug!("Response superseded by interruption, dropping stream");
                return Outcome::Superseded;
            }
            () = flush_timer => {
                deadline = None;
                if let Some(unit) = segmenter.flush() {
                    tracing::debug!("Flush timer fired");
                    if matches!(cycle.enqueue(&unit).await, Queued::Abandon) {
                        return Outcome::abandoned(ctx);
                    }
                }
            }
            fragment = stream.next() => {
                let Some(fragment) = fragment else { break };
                if ctx.epoch() != epoch {
                    tracing::debug!("Response superseded by interruption, dropping stream");
                    return Outcome::Superseded;
                }
                ctx.deps.broadcast.publish(UiEvent::ResponseFragment {
                    session_key: session_key.to_owned(),
                    text: fragment.clone(),
                });
                let speakable = filter.push(&fragment);
                if !cycle.enqueue_all(segmenter.push(&speakable)).await {
                    return Outcome::abandoned(ctx);
                }
                deadline = segmenter.flush_delay().map(|delay| Instant::now() + delay);
            }
        }
    }

    let mut tail = segmenter.push(&filter.finish());
    tail.extend(segmenter.finish());
    if !cycle.enqueue_all(tail).await {
        return Outcome::abandoned(ctx);
    }

    ctx.deps.broadcast.publish(UiEvent::ResponseComplete {
        session_key: session_key.to_owned(),
    });

    if cycle.queued == 0 {
        tracing::debug!("Response produced no speakable text");
        return Outcome::Silent { epoch };
    }
    Outcome::Spoken { epoch }
}
