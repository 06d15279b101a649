use async_trait::async_trait;
use parley_core::{CollaboratorError, SynthesisRequest, Synthesizer};
use serde::Serialize;

use crate::config::{RemoteConfig, RemoteEndpoint};
use crate::http;

/// `POST /audio/speech` client.
///
/// With the default `pcm` format the server must return 16-bit mono PCM at the
/// connection's output rate. Any container format (wav, mp3, ...) is passed
/// through untouched by the pipeline.
pub struct RemoteSynthesizer {
    client: reqwest::Client,
    endpoint: RemoteEndpoint,
    format: String,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

impl RemoteSynthesizer {
    pub fn new(config: &RemoteConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: http::build_client(config.connect_timeout(), Some(config.request_timeout()))?,
            endpoint: config.speech.clone(),
            format: config.speech_format.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for RemoteSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Vec<u8>, CollaboratorError> {
        let body = SpeechRequest {
            model: &self.endpoint.model,
            input: request.text,
            voice: request.voice,
            response_format: &self.format,
        };
        let response = http::send(
            http::post(&self.client, &self.endpoint, "audio/speech").json(&body),
        )
        .await?;
        let audio = response
            .bytes()
            .await
            .map_err(|e| http::transport_error(&e))?;
        if audio.is_empty() {
            return Err(CollaboratorError::InvalidResponse(
                "speech endpoint returned no audio".into(),
            ));
        }
        tracing::debug!(bytes = audio.len(), voice = request.voice, "Speech synthesized");
        Ok(audio.to_vec())
    }
}
