//! Wake-word listener: a lightweight listening mode that runs before a full
//! conversation is opened.
//!
//! Frames go through the same noise gate and VAD as a connection. A speech
//! run between `min_speech_ms` and `max_speech_ms` is transcribed once
//! silence resumes and fuzzy-matched against the configured trigger phrase.
//! On a match the detection callback fires; opening the conversation is up
//! to the caller.

use std::sync::Arc;

use parley_core::{Transcriber, VoiceSettings, WakeSettings};
use tokio_util::sync::CancellationToken;

use crate::gate::NoiseGate;
use crate::pcm;
use crate::transport::InboundQueue;
use crate::vad::{VadProvider, VoiceActivityDetector};

/// Detection callback; receives the matched transcript.
pub type WakeCallback = Arc<dyn Fn(String) + Send + Sync>;

pub struct WakeWordListener {
    gate: NoiseGate,
    vad: Box<dyn VoiceActivityDetector>,
    transcriber: Arc<dyn Transcriber>,
    on_wake: WakeCallback,
    wake: WakeSettings,
    sample_rate: u32,
    samples: Vec<i16>,
    in_run: bool,
    too_long: bool,
    silent_run: u32,
}

impl WakeWordListener {
    pub fn new(
        settings: &VoiceSettings,
        vad: &dyn VadProvider,
        transcriber: Arc<dyn Transcriber>,
        on_wake: WakeCallback,
    ) -> Self {
        Self {
            gate: NoiseGate::new(&settings.gate),
            vad: vad.create(),
            transcriber,
            on_wake,
            wake: settings.wake.clone(),
            sample_rate: settings.input_sample_rate,
            samples: Vec::new(),
            in_run: false,
            too_long: false,
            silent_run: 0,
        }
    }

    /// Feed one frame. Returns the matched transcript when the wake phrase
    /// was detected on this frame.
    pub async fn process_frame(&mut self, frame: &[i16]) -> Option<String> {
        let speech = self.gate.filter(frame).is_some() && self.vad.is_speech(frame);

        if speech {
            if !self.in_run {
                self.in_run = true;
                self.too_long = false;
                self.samples.clear();
            }
            self.silent_run = 0;
            if !self.too_long {
                self.samples.extend_from_slice(frame);
                if pcm::duration_ms(self.samples.len(), self.sample_rate) > self.wake.max_speech_ms {
                    tracing::debug!("Speech run too long for a wake phrase, abandoning");
                    self.too_long = true;
                    self.samples.clear();
                }
            }
            return None;
        }

        if !self.in_run {
            return None;
        }
        self.silent_run += 1;
        if self.silent_run < self.wake.end_silence_frames {
            return None;
        }

        self.in_run = false;
        self.vad.reset();
        let samples = std::mem::take(&mut self.samples);
        let duration_ms = pcm::duration_ms(samples.len(), self.sample_rate);
        if self.too_long || duration_ms < self.wake.min_speech_ms {
            return None;
        }

        match self
            .transcriber
            .transcribe(&pcm::to_f32(&samples), self.sample_rate)
            .await
        {
            Ok(transcript) if matches_wake_phrase(&transcript, &self.wake) => {
                tracing::info!(transcript = %transcript, "Wake phrase detected");
                (self.on_wake)(transcript.clone());
                Some(transcript)
            }
            Ok(transcript) => {
                tracing::debug!(transcript = %transcript, "Not a wake phrase");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Wake-word transcription failed");
                None
            }
        }
    }

    /// Consume frames until cancelled or the queue closes.
    pub async fn run(mut self, frames: Arc<InboundQueue>, cancel: CancellationToken) {
        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => break,
                frame = frames.recv() => frame,
            };
            let Some(frame) = frame else { break };
            self.process_frame(&frame).await;
        }
        tracing::debug!("Wake-word listener stopped");
    }
}

/// Whether `transcript` is one of the trigger phrases.
///
/// Matches when the normalized transcript starts with a known variant, or
/// when its leading words are within `max_edit_distance` of the canonical
/// phrase.
pub fn matches_wake_phrase(transcript: &str, wake: &WakeSettings) -> bool {
    let text = normalize(transcript);
    if text.is_empty() {
        return false;
    }

    let prefix_match = wake
        .variants
        .iter()
        .map(|v| normalize(v))
        .filter(|v| !v.is_empty())
        .any(|variant| {
            text == variant
                || text
                    .strip_prefix(variant.as_str())
                    .is_some_and(|rest| rest.starts_with(' '))
        });
    if prefix_match {
        return true;
    }

    let phrase = normalize(&wake.phrase);
    if phrase.is_empty() {
        return false;
    }
    let words = phrase.split(' ').count();
    let head: Vec<&str> = text.split(' ').take(words).collect();
    edit_distance(&head.join(" "), &phrase) <= wake.max_edit_distance
}

/// Lowercase, punctuation to spaces, single-spaced.
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitute.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
