//! Detector shell for windowed recurrent classifiers such as Silero.
//!
//! Buffers frames into fixed windows, prefixes each window with the tail of
//! the previous one, and threads the hidden state through the model. A failed
//! inference keeps the previous decision.

use super::VoiceActivityDetector;
use crate::error::VoiceError;

/// One inference step of a windowed recurrent speech classifier.
pub trait WindowedModel: Send {
    /// Samples per window.
    fn window(&self) -> usize;

    /// Trailing samples of the previous window prepended to the next one.
    fn context(&self) -> usize;

    /// Length of the recurrent state.
    fn state_len(&self) -> usize;

    /// Run one `context + window` input. Returns the speech probability and
    /// the next state.
    fn infer(&self, input: &[f32], state: &[f32]) -> Result<(f32, Vec<f32>), VoiceError>;
}

/// Per-connection detector owning the recurrent state of one model.
pub struct RecurrentVad<M> {
    model: M,
    threshold: f32,
    max_consecutive_failures: u32,
    state: Vec<f32>,
    context: Vec<f32>,
    pending: Vec<f32>,
    speaking: bool,
    consecutive_failures: u32,
}

impl<M: WindowedModel> RecurrentVad<M> {
    pub fn new(model: M, threshold: f32, max_consecutive_failures: u32) -> Self {
        let state = vec![0.0; model.state_len()];
        let context = vec![0.0; model.context()];
        Self {
            model,
            threshold,
            max_consecutive_failures,
            state,
            context,
            pending: Vec::new(),
            speaking: false,
            consecutive_failures: 0,
        }
    }

    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn classify_window(&mut self, window: &[f32]) {
        let mut input = Vec::with_capacity(self.context.len() + window.len());
        input.extend_from_slice(&self.context);
        input.extend_from_slice(window);
        let keep = self.context.len();
        self.context.copy_from_slice(&input[input.len() - keep..]);

        match self.model.infer(&input, &self.state) {
            Ok((probability, next_state)) if next_state.len() == self.state.len() => {
                self.state = next_state;
                self.speaking = probability >= self.threshold;
                self.consecutive_failures = 0;
            }
            Ok((_, next_state)) => {
                self.record_failure(&format!("unexpected state length {}", next_state.len()));
            }
            Err(e) => self.record_failure(&e.to_string()),
        }
    }

    /// Keep the previous decision; reset after too many failures in a row.
    fn record_failure(&mut self, reason: &str) {
        self.consecutive_failures += 1;
        tracing::debug!(
            reason,
            consecutive = self.consecutive_failures,
            "VAD inference failed, keeping previous decision"
        );
        if self.consecutive_failures >= self.max_consecutive_failures {
            tracing::warn!(
                failures = self.consecutive_failures,
                "VAD kept failing, resetting detector state"
            );
            self.reset();
        }
    }
}

impl<M: WindowedModel> VoiceActivityDetector for RecurrentVad<M> {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        self.pending
            .extend(frame.iter().map(|&s| f32::from(s) / 32_768.0));
        let window = self.model.window();
        while self.pending.len() >= window {
            let chunk: Vec<f32> = self.pending.drain(..window).collect();
            self.classify_window(&chunk);
        }
        self.speaking
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
        self.context.fill(0.0);
        self.pending.clear();
        self.speaking = false;
        self.consecutive_failures = 0;
    }
}
