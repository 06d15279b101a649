use async_trait::async_trait;
use parley_core::{CollaboratorError, Transcriber};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::{RemoteConfig, RemoteEndpoint};
use crate::http;
use crate::wav::encode_wav;

/// `POST /audio/transcriptions` client.
pub struct RemoteTranscriber {
    client: reqwest::Client,
    endpoint: RemoteEndpoint,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

impl RemoteTranscriber {
    pub fn new(config: &RemoteConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: http::build_client(config.connect_timeout(), Some(config.request_timeout()))?,
            endpoint: config.transcription.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    async fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<String, CollaboratorError> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let wav = encode_wav(samples, sample_rate);
        let part = Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| CollaboratorError::Other(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.endpoint.model.clone())
            .text("response_format", "json");

        let request = http::post(&self.client, &self.endpoint, "audio/transcriptions").multipart(form);
        let response = http::send(request).await?;
        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        tracing::debug!(chars = body.text.len(), "Transcription received");
        Ok(body.text.trim().to_owned())
    }
}
