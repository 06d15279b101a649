//! Speech loop (TTS stage): speakable unit → synthesis → paced frames.

use std::sync::Arc;

use parley_core::{ControlMessage, SynthesisRequest};

use super::context::{ConnectionContext, SpeechItem};
use crate::pcm;
use crate::transport::OutboundAudio;

pub(crate) async fn run(ctx: Arc<ConnectionContext>) {
    loop {
        let item = tokio::select! {
            () = ctx.cancel.cancelled() => break,
            item = ctx.units.recv() => item,
        };
        match item {
            Some(SpeechItem::Unit { epoch, text }) => speak(&ctx, epoch, &text).await,
            Some(SpeechItem::EndOfResponse { epoch }) => {
                ctx.resume_listening(epoch).await;
            }
            None => break,
        }
    }
    tracing::debug!(session = %ctx.session_key, "Speech loop stopped");
}

async fn speak(ctx: &ConnectionContext, epoch: u64, text: &str) {
    if !ctx.begin_speaking(epoch).await {
        tracing::debug!(unit = text, "Skipping stale speakable unit");
        return;
    }

    let output = ctx.output();
    let request = SynthesisRequest {
        text,
        voice: &output.voice,
        sample_rate: output.sample_rate,
    };
    let audio = match ctx.deps.synthesizer.synthesize(request).await {
        Ok(audio) => audio,
        Err(e) => {
            tracing::warn!(error = %e, unit = text, "Synthesis failed, skipping unit");
            ctx.send(ControlMessage::error(format!("Speech synthesis failed: {e}")))
                .await;
            return;
        }
    };

    if let Some(container) = pcm::detect_container(&audio) {
        tracing::debug!(encoding = container.encoding(), bytes = audio.len(), "Forwarding encoded audio");
        ctx.push_frame_if_current(
            epoch,
            OutboundAudio {
                data: audio,
                container: Some(container),
                sample_rate: output.sample_rate,
            },
        );
        return;
    }

    let playback = &ctx.settings.playback;
    for frame in pcm::playback_frames(&audio, output.sample_rate, playback.frame_ms) {
        if !ctx.push_frame_if_current(epoch, OutboundAudio::pcm(frame.to_vec(), output.sample_rate)) {
            tracing::debug!("Playback interrupted");
            return;
        }
        tokio::select! {
            () = ctx.cancel.cancelled() => return,
            () = tokio::time::sleep(playback.pace()) => {}
        }
    }
}
