//! Endpoint configuration and construction of the collaborator set.

use std::sync::Arc;
use std::time::Duration;

use parley_core::{AgentRunner, CollaboratorError, Synthesizer, Transcriber};
use serde::{Deserialize, Serialize};

use crate::agent::RemoteAgent;
use crate::synthesizer::RemoteSynthesizer;
use crate::transcriber::RemoteTranscriber;

/// One OpenAI-compatible service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    /// Base URL including the API prefix, e.g. `http://127.0.0.1:8080/v1`.
    pub base_url: String,
    /// Sent as a bearer token when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
}

impl RemoteEndpoint {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
        }
    }

    /// `{base_url}/{path}` without doubled slashes.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Configuration for all three HTTP collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub transcription: RemoteEndpoint,
    pub speech: RemoteEndpoint,
    pub chat: RemoteEndpoint,
    /// Prepended to every chat request.
    pub system_prompt: Option<String>,
    /// `response_format` requested from the speech endpoint.
    pub speech_format: String,
    /// Bound on the per-session history (user and assistant messages).
    pub max_history_messages: usize,
    /// Whole-request timeout for transcription and speech. Chat streams are
    /// only bounded by the connect timeout.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            transcription: RemoteEndpoint::new("http://127.0.0.1:8080/v1", "whisper-1"),
            speech: RemoteEndpoint::new("http://127.0.0.1:8880/v1", "kokoro"),
            chat: RemoteEndpoint::new("http://127.0.0.1:8080/v1", "default"),
            system_prompt: Some(
                "You are a helpful voice assistant. Answer briefly in plain spoken \
                 sentences without markdown or lists."
                    .to_owned(),
            ),
            speech_format: "pcm".to_owned(),
            max_history_messages: 20,
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Build the three collaborators. They share nothing but this config.
    pub fn build(&self) -> Result<RemoteCollaborators, CollaboratorError> {
        Ok(RemoteCollaborators {
            transcriber: Arc::new(RemoteTranscriber::new(self)?),
            synthesizer: Arc::new(RemoteSynthesizer::new(self)?),
            agent: Arc::new(RemoteAgent::new(self)?),
        })
    }
}

/// Ready-to-inject collaborator set.
#[derive(Clone)]
pub struct RemoteCollaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub agent: Arc<dyn AgentRunner>,
}

impl std::fmt::Debug for RemoteCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCollaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let endpoint = RemoteEndpoint::new("http://host:1/v1/", "m");
        assert_eq!(endpoint.url("/audio/speech"), "http://host:1/v1/audio/speech");
        assert_eq!(endpoint.url("chat/completions"), "http://host:1/v1/chat/completions");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: RemoteConfig = serde_json::from_str(
            r#"{"chat": {"base_url": "http://llm:9000/v1", "model": "qwen", "api_key": "k"}}"#,
        )
        .unwrap();
        assert_eq!(config.chat.model, "qwen");
        assert_eq!(config.chat.api_key.as_deref(), Some("k"));
        assert_eq!(config.speech, RemoteConfig::default().speech);
        assert_eq!(config.max_history_messages, 20);
    }

    #[test]
    fn build_produces_all_collaborators() {
        let collaborators = RemoteConfig::default().build().unwrap();
        assert!(format!("{collaborators:?}").contains("RemoteCollaborators"));
    }
}
