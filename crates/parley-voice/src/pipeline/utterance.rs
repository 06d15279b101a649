//! Utterance loop (ASR stage): gate → VAD → accumulate → transcribe.

use std::collections::VecDeque;
use std::sync::Arc;

use parley_core::{ControlMessage, ConversationState, UiEvent, UtteranceSettings};

use super::context::ConnectionContext;
use crate::pcm;

/// Classification of one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameClass {
    /// Below the noise gate; never shown to the VAD.
    Gated,
    Silence,
    Speech,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Idle,
    Started,
    Continuing,
    /// Utterance complete; carries its samples.
    Ended(Vec<i16>),
}

/// Accumulates one utterance at a time.
#[derive(Debug)]
pub(crate) struct UtteranceBuilder {
    pre_roll: VecDeque<Vec<i16>>,
    pre_roll_frames: usize,
    samples: Vec<i16>,
    accumulating: bool,
    silent_run: u32,
    end_silence_frames: u32,
    max_trailing_frames: u32,
    max_samples: usize,
}

impl UtteranceBuilder {
    pub fn new(settings: &UtteranceSettings, sample_rate: u32) -> Self {
        let max_samples = u64::from(sample_rate) * settings.max_utterance_ms / 1000;
        Self {
            pre_roll: VecDeque::new(),
            pre_roll_frames: usize::try_from(settings.pre_roll_frames).unwrap_or(usize::MAX),
            samples: Vec::new(),
            accumulating: false,
            silent_run: 0,
            end_silence_frames: settings.end_silence_frames,
            max_trailing_frames: settings.max_trailing_silence_frames,
            max_samples: usize::try_from(max_samples).unwrap_or(usize::MAX),
        }
    }

    #[cfg(test)]
    pub const fn is_accumulating(&self) -> bool {
        self.accumulating
    }

    pub fn push(&mut self, frame: &[i16], class: FrameClass) -> Step {
        if !self.accumulating {
            return match class {
                FrameClass::Speech => {
                    self.accumulating = true;
                    self.silent_run = 0;
                    self.samples = self.pre_roll.drain(..).flatten().collect();
                    self.samples.extend_from_slice(frame);
                    Step::Started
                }
                FrameClass::Silence => {
                    if self.pre_roll_frames > 0 {
                        if self.pre_roll.len() == self.pre_roll_frames {
                            self.pre_roll.pop_front();
                        }
                        self.pre_roll.push_back(frame.to_vec());
                    }
                    Step::Idle
                }
                FrameClass::Gated => {
                    self.pre_roll.clear();
                    Step::Idle
                }
            };
        }

        if class == FrameClass::Speech {
            self.silent_run = 0;
            self.samples.extend_from_slice(frame);
        } else {
            self.silent_run += 1;
            if self.silent_run <= self.max_trailing_frames {
                self.samples.extend_from_slice(frame);
            }
            if self.silent_run >= self.end_silence_frames {
                return self.end();
            }
        }

        if self.samples.len() >= self.max_samples {
            tracing::debug!("Utterance reached maximum length");
            return self.end();
        }
        Step::Continuing
    }

    fn end(&mut self) -> Step {
        self.accumulating = false;
        self.silent_run = 0;
        self.pre_roll.clear();
        Step::Ended(std::mem::take(&mut self.samples))
    }
}

/// Bracketed non-speech annotations and sentinel words ASR engines emit for
/// silence.
pub(crate) fn is_placeholder(transcript: &str) -> bool {
    const SENTINELS: &[&str] = &[
        "blank_audio",
        "blank audio",
        "silence",
        "no speech",
        "inaudible",
        "music",
        "noise",
    ];
    let text = transcript.trim();
    if text.is_empty() {
        return true;
    }
    let enclosed = |open: char, close: char| {
        text.len() >= 2
            && text.starts_with(open)
            && text.ends_with(close)
            && text[1..].find(close) == Some(text.len() - 2)
    };
    if enclosed('[', ']') || enclosed('(', ')') || enclosed('*', '*') {
        return true;
    }
    let normalized = text
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    SENTINELS.contains(&normalized.as_str())
}

pub(crate) async fn run(ctx: Arc<ConnectionContext>) {
    let sample_rate = ctx.settings.input_sample_rate;
    let mut builder = UtteranceBuilder::new(&ctx.settings.utterance, sample_rate);
    let mut last_vad: Option<bool> = None;

    loop {
        let frame = tokio::select! {
            () = ctx.cancel.cancelled() => break,
            frame = ctx.inbound.recv() => frame,
        };
        let Some(frame) = frame else { break };

        let passed = ctx.gate().filter(&frame).is_some();
        let class = if passed {
            let speech = ctx.vad().is_speech(&frame);
            if !ctx.settings.coalesce_vad_state || last_vad != Some(speech) {
                ctx.send(ControlMessage::vad_state(speech)).await;
            }
            last_vad = Some(speech);
            if speech { FrameClass::Speech } else { FrameClass::Silence }
        } else {
            FrameClass::Gated
        };

        match builder.push(&frame, class) {
            Step::Idle => {}
            Step::Started | Step::Continuing => {
                if class == FrameClass::Speech && ctx.state() == ConversationState::Speaking {
                    ctx.interrupt().await;
                }
            }
            Step::Ended(samples) => {
                ctx.vad().reset();
                last_vad = None;
                if !handle_utterance(&ctx, &samples, sample_rate).await {
                    break;
                }
            }
        }
    }
    tracing::debug!(session = %ctx.session_key, "Utterance loop stopped");
}

/// Transcribe a finished utterance and hand it on. Returns `false` once the
/// transcript queue is closed.
async fn handle_utterance(ctx: &ConnectionContext, samples: &[i16], sample_rate: u32) -> bool {
    let duration_ms = pcm::duration_ms(samples.len(), sample_rate);
    if duration_ms < ctx.settings.utterance.min_utterance_ms {
        tracing::debug!(duration_ms, "Discarding short utterance as noise");
        return true;
    }

    tracing::debug!(duration_ms, "Utterance ended, transcribing");
    let text = match ctx
        .deps
        .transcriber
        .transcribe(&pcm::to_f32(samples), sample_rate)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "Transcription failed");
            ctx.send(ControlMessage::error(format!("Transcription failed: {e}")))
                .await;
            return true;
        }
    };

    let text = text.trim();
    if is_placeholder(text) {
        tracing::debug!(transcript = text, "Empty or placeholder transcript, ignoring");
        return true;
    }

    tracing::info!(session = %ctx.session_key, transcript = text, "User utterance");
    ctx.send(ControlMessage::transcript(text)).await;
    ctx.deps.broadcast.publish(UiEvent::UserUtterance {
        session_key: ctx.session_key.clone(),
        text: text.to_owned(),
    });
    ctx.accept_transcript().await;
    ctx.transcripts.push(text.to_owned()).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: [i16; 320] = [1_000; 320];

    fn builder() -> UtteranceBuilder {
        UtteranceBuilder::new(&UtteranceSettings::default(), 16_000)
    }

    #[test]
    fn silence_never_starts_an_utterance() {
        let mut b = builder();
        for _ in 0..100 {
            assert_eq!(b.push(&FRAME, FrameClass::Silence), Step::Idle);
            assert_eq!(b.push(&FRAME, FrameClass::Gated), Step::Idle);
        }
        assert!(!b.is_accumulating());
    }

    #[test]
    fn ends_after_end_silence_frames() {
        let mut b = builder();
        assert_eq!(b.push(&FRAME, FrameClass::Speech), Step::Started);
        for _ in 0..24 {
            assert_eq!(b.push(&FRAME, FrameClass::Gated), Step::Continuing);
        }
        let Step::Ended(samples) = b.push(&FRAME, FrameClass::Gated) else {
            panic!("utterance should end on the 25th silent frame");
        };
        // onset frame + 15 trailing frames
        assert_eq!(samples.len(), 320 * 16);
        assert!(!b.is_accumulating());
    }

    #[test]
    fn speech_resets_silence_run() {
        let mut b = builder();
        b.push(&FRAME, FrameClass::Speech);
        for _ in 0..20 {
            b.push(&FRAME, FrameClass::Silence);
        }
        assert_eq!(b.push(&FRAME, FrameClass::Speech), Step::Continuing);
        for _ in 0..24 {
            assert_eq!(b.push(&FRAME, FrameClass::Silence), Step::Continuing);
        }
        assert!(matches!(b.push(&FRAME, FrameClass::Silence), Step::Ended(_)));
    }

    #[test]
    fn pre_roll_is_prepended() {
        let mut b = builder();
        for _ in 0..5 {
            b.push(&[1; 10], FrameClass::Silence);
        }
        b.push(&[2; 10], FrameClass::Speech);
        let mut ended = None;
        for _ in 0..25 {
            if let Step::Ended(s) = b.push(&[0; 10], FrameClass::Gated) {
                ended = Some(s);
            }
        }
        let samples = ended.unwrap();
        assert_eq!(&samples[..30], &[1; 30]);
        assert_eq!(&samples[30..40], &[2; 10]);
    }

    #[test]
    fn gated_frame_breaks_pre_roll() {
        let mut b = builder();
        b.push(&[1; 10], FrameClass::Silence);
        b.push(&[0; 10], FrameClass::Gated);
        b.push(&[2; 10], FrameClass::Speech);
        let mut ended = None;
        for _ in 0..25 {
            if let Step::Ended(s) = b.push(&[0; 10], FrameClass::Gated) {
                ended = Some(s);
            }
        }
        assert_eq!(&ended.unwrap()[..10], &[2; 10]);
    }

    #[test]
    fn max_length_forces_end() {
        let settings = UtteranceSettings {
            max_utterance_ms: 100,
            ..UtteranceSettings::default()
        };
        let mut b = UtteranceBuilder::new(&settings, 16_000);
        b.push(&FRAME, FrameClass::Speech);
        assert_eq!(b.push(&FRAME, FrameClass::Speech), Step::Continuing);
        let mut steps = 2;
        while !matches!(b.push(&FRAME, FrameClass::Speech), Step::Ended(_)) {
            steps += 1;
        }
        // 100 ms at 16 kHz = 1600 samples: the fifth frame ends it.
        assert_eq!(steps, 4);
    }

    #[test]
    fn placeholders_are_detected() {
        for text in ["", "  ", "[BLANK_AUDIO]", "(silence)", "[Music]", "*inaudible*", "Silence."] {
            assert!(is_placeholder(text), "{text:?}");
        }
        for text in ["hello", "[laughs] that's funny", "no speech here please"] {
            assert!(!is_placeholder(text), "{text:?}");
        }
    }
}
