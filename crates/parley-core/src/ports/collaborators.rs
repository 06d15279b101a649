use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use super::CollaboratorError;

/// Live, ordered, finite sequence of response text fragments.
///
/// Stream-level failures are not signalled separately: the stream just ends.
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Speech-to-text engine.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe mono `f32` samples in `[-1.0, 1.0]`.
    ///
    /// Empty input must yield an empty string, not an error.
    async fn transcribe(&self, samples: &[f32], sample_rate: u32)
    -> Result<String, CollaboratorError>;
}

/// Parameters of one synthesis call.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub voice: &'a str,
    /// Rate the connection plays raw PCM at. Engines returning raw PCM
    /// should produce it at this rate.
    pub sample_rate: u32,
}

/// Text-to-speech engine.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Returns raw little-endian PCM16 mono, or a self-describing encoded
    /// container (WAV, AIFF, MP3, OGG, FLAC) that is passed through untouched.
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Vec<u8>, CollaboratorError>;
}

/// Conversational agent that turns a prompt into streamed text.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        session_key: &str,
        prompt: &str,
        channel: &str,
    ) -> Result<TextStream, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{StreamExt, stream};

    struct Echo;

    #[async_trait]
    impl AgentRunner for Echo {
        async fn run(
            &self,
            _session_key: &str,
            prompt: &str,
            _channel: &str,
        ) -> Result<TextStream, CollaboratorError> {
            let words: Vec<String> = prompt.split(' ').map(str::to_owned).collect();
            Ok(Box::pin(stream::iter(words)))
        }
    }

    #[test]
    fn agent_runner_is_object_safe() {
        let runner: Box<dyn AgentRunner> = Box::new(Echo);
        let fragments: Vec<String> = tokio_test::block_on(async {
            runner
                .run("s1", "hello there", "voice")
                .await
                .unwrap()
                .collect()
                .await
        });
        assert_eq!(fragments, vec!["hello", "there"]);
    }
}
