//! Command-line definition.
//!
//! Every flag can also be set through the environment (and therefore a
//! `.env` file). Flags win over the JSON config file.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "parley")]
#[command(about = "Full-duplex voice conversation server")]
#[command(version)]
pub struct Cli {
    /// Address to bind
    #[arg(long, env = "PARLEY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PARLEY_PORT", default_value_t = 9890)]
    pub port: u16,

    /// JSON file with `voice` (pipeline settings) and `remote` (HTTP
    /// collaborators) sections
    #[arg(short, long, env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Allowed CORS origins, comma separated. Empty allows any origin.
    #[arg(long = "allow-origin", env = "PARLEY_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Concurrent voice sockets; 0 for unlimited
    #[arg(long, env = "PARLEY_MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,

    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, env = "PARLEY_LOG", default_value = "info")]
    pub log_level: String,

    // ── Pipeline ─────────────────────────────────────────────────────
    /// Default synthesis voice
    #[arg(long, env = "PARLEY_VOICE")]
    pub voice: Option<String>,

    /// Silero VAD ONNX model; the energy detector is used without it
    #[arg(long, env = "PARLEY_VAD_MODEL")]
    pub vad_model: Option<PathBuf>,

    // ── Collaborators ────────────────────────────────────────────────
    /// Base URL of the transcription service (OpenAI-compatible)
    #[arg(long, env = "PARLEY_STT_URL")]
    pub stt_url: Option<String>,

    #[arg(long, env = "PARLEY_STT_MODEL")]
    pub stt_model: Option<String>,

    /// Base URL of the speech service (OpenAI-compatible)
    #[arg(long, env = "PARLEY_TTS_URL")]
    pub tts_url: Option<String>,

    #[arg(long, env = "PARLEY_TTS_MODEL")]
    pub tts_model: Option<String>,

    /// Base URL of the chat-completions service
    #[arg(long, env = "PARLEY_LLM_URL")]
    pub llm_url: Option<String>,

    #[arg(long, env = "PARLEY_LLM_MODEL")]
    pub llm_model: Option<String>,

    #[arg(long, env = "PARLEY_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Bearer token for every collaborator without its own key
    #[arg(long, env = "PARLEY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "PARLEY_STT_API_KEY", hide_env_values = true)]
    pub stt_api_key: Option<String>,

    #[arg(long, env = "PARLEY_TTS_API_KEY", hide_env_values = true)]
    pub tts_api_key: Option<String>,

    #[arg(long, env = "PARLEY_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,
}
