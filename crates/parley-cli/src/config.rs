//! Resolution of the effective server and collaborator configuration.
//!
//! Precedence, lowest first: built-in defaults, the JSON config file, then
//! flags / environment variables.

use std::path::Path;

use anyhow::{Context, Result};
use parley_axum::{CorsConfig, ServerConfig};
use parley_core::VoiceSettings;
use parley_remote::{RemoteConfig, RemoteEndpoint};
use serde::Deserialize;

use crate::parser::Cli;

/// On-disk configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub voice: VoiceSettings,
    pub remote: RemoteConfig,
    pub max_connections: Option<usize>,
}

pub fn load_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

/// Fully resolved configuration for one run.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
}

impl Cli {
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let file = match &self.config {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };
        Ok(self.apply(file))
    }

    fn apply(&self, file: FileConfig) -> ResolvedConfig {
        let FileConfig {
            mut voice,
            mut remote,
            max_connections,
        } = file;

        if let Some(name) = &self.voice {
            voice.voice.clone_from(name);
        }
        if let Some(path) = &self.vad_model {
            voice.vad.model_path = Some(path.clone());
        }

        override_endpoint(
            &mut remote.transcription,
            self.stt_url.as_ref(),
            self.stt_model.as_ref(),
            self.stt_api_key.as_ref().or(self.api_key.as_ref()),
        );
        override_endpoint(
            &mut remote.speech,
            self.tts_url.as_ref(),
            self.tts_model.as_ref(),
            self.tts_api_key.as_ref().or(self.api_key.as_ref()),
        );
        override_endpoint(
            &mut remote.chat,
            self.llm_url.as_ref(),
            self.llm_model.as_ref(),
            self.llm_api_key.as_ref().or(self.api_key.as_ref()),
        );
        if let Some(prompt) = &self.system_prompt {
            remote.system_prompt = Some(prompt.clone());
        }

        let cors = if self.allowed_origins.is_empty() {
            CorsConfig::AllowAll
        } else {
            CorsConfig::AllowOrigins(self.allowed_origins.clone())
        };

        ResolvedConfig {
            server: ServerConfig {
                host: self.host.clone(),
                port: self.port,
                cors,
                max_connections: self.max_connections.or(max_connections).unwrap_or(0),
                settings: voice,
            },
            remote,
        }
    }
}

fn override_endpoint(
    endpoint: &mut RemoteEndpoint,
    url: Option<&String>,
    model: Option<&String>,
    api_key: Option<&String>,
) {
    if let Some(url) = url {
        endpoint.base_url.clone_from(url);
    }
    if let Some(model) = model {
        endpoint.model.clone_from(model);
    }
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        endpoint.api_key = Some(key.clone());
    }
}
