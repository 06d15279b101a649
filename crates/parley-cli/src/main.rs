//! CLI entry point - the composition root.
//!
//! Wires the HTTP collaborators into the axum server and runs it until
//! Ctrl+C.

use anyhow::Context;
use clap::Parser;
use parley_axum::{Collaborators, start_server};
use parley_cli::Cli;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads them
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let resolved = cli.resolve()?;
    let remote = resolved
        .remote
        .build()
        .context("failed to build HTTP collaborators")?;
    tracing::info!(
        stt = %resolved.remote.transcription.url("audio/transcriptions"),
        tts = %resolved.remote.speech.url("audio/speech"),
        llm = %resolved.remote.chat.url("chat/completions"),
        "Collaborators configured"
    );

    let collaborators = Collaborators {
        transcriber: remote.transcriber,
        synthesizer: remote.synthesizer,
        agent: remote.agent,
        broadcast: None,
    };

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
            }
        }
    });

    start_server(resolved.server, collaborators, shutdown).await
}
