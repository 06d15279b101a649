//! Axum server bootstrap - the composition root.
//!
//! This module is the only place where the voice pipeline, the VAD backend
//! and the injected collaborators are wired together for the web adapter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use parley_core::{
    AgentRunner, Synthesizer, Transcriber, UiBroadcast, UiEvent, VoiceSettings, validate_settings,
};
use parley_voice::{ConnectionDeps, select_vad_provider};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins (development mode).
    #[default]
    AllowAll,
    /// Allow specific origins (production mode).
    AllowOrigins(Vec<String>),
}

/// Server configuration for the Axum adapter.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
    /// Concurrent voice / wake sockets. `0` means unlimited.
    pub max_connections: usize,
    pub settings: VoiceSettings,
}

impl ServerConfig {
    pub fn with_defaults() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9890,
            cors: CorsConfig::default(),
            max_connections: 0,
            settings: VoiceSettings::default(),
        }
    }

    /// Set CORS to allow specific origins.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors = CorsConfig::AllowOrigins(origins);
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Externally provided collaborators.
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub agent: Arc<dyn AgentRunner>,
    /// Defaults to [`LogBroadcast`].
    pub broadcast: Option<Arc<dyn UiBroadcast>>,
}

/// UI broadcast that only traces events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBroadcast;

impl UiBroadcast for LogBroadcast {
    fn publish(&self, event: UiEvent) {
        match &event {
            UiEvent::UserUtterance { session_key, text } => {
                tracing::debug!(target: "parley::ui", session = %session_key, text = %text, "User utterance");
            }
            UiEvent::ResponseFragment { session_key, text } => {
                tracing::trace!(target: "parley::ui", session = %session_key, text = %text, "Response fragment");
            }
            UiEvent::ResponseComplete { session_key } => {
                tracing::debug!(target: "parley::ui", session = %session_key, "Response complete");
            }
        }
    }
}

/// Counts live sockets against an optional limit.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
}

/// Releases its slot on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConnectionTracker {
    /// Take a slot, or `None` if `limit` (non-zero) is reached.
    pub fn try_acquire(&self, limit: usize) -> Option<ConnectionSlot> {
        let acquired = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (limit == 0 || n < limit).then_some(n + 1)
            })
            .is_ok();
        acquired.then(|| ConnectionSlot {
            active: Arc::clone(&self.active),
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Application context for the Axum adapter.
pub struct AxumContext {
    pub settings: VoiceSettings,
    pub deps: ConnectionDeps,
    pub connections: ConnectionTracker,
    pub max_connections: usize,
    /// Cancelled when the server shuts down; every live connection follows it.
    pub shutdown: CancellationToken,
}

/// Validate settings, probe the VAD backend and assemble the context.
pub fn bootstrap(
    config: &ServerConfig,
    collaborators: Collaborators,
    shutdown: CancellationToken,
) -> Result<AxumContext> {
    validate_settings(&config.settings).context("invalid voice settings")?;

    let settings = config.settings.clone();
    let vad = select_vad_provider(&settings.vad, settings.input_sample_rate);
    tracing::info!(
        vad = vad.name(),
        input_sample_rate = settings.input_sample_rate,
        output_sample_rate = settings.output_sample_rate,
        voice = %settings.voice,
        "Voice pipeline configured"
    );

    let deps = ConnectionDeps {
        transcriber: collaborators.transcriber,
        synthesizer: collaborators.synthesizer,
        agent: collaborators.agent,
        broadcast: collaborators
            .broadcast
            .unwrap_or_else(|| Arc::new(LogBroadcast)),
        vad,
    };

    Ok(AxumContext {
        settings,
        deps,
        connections: ConnectionTracker::default(),
        max_connections: config.max_connections,
        shutdown,
    })
}

/// Serve `ctx` on an already-bound listener until `ctx.shutdown` is cancelled.
pub async fn serve(listener: TcpListener, ctx: AxumContext, cors: &CorsConfig) -> Result<()> {
    let shutdown = ctx.shutdown.clone();
    let app = crate::routes::create_router(ctx, cors);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server error")?;
    Ok(())
}

/// Bootstrap and run the web server until `shutdown` is cancelled.
pub async fn start_server(
    config: ServerConfig,
    collaborators: Collaborators,
    shutdown: CancellationToken,
) -> Result<()> {
    let ctx = bootstrap(&config, collaborators, shutdown)?;

    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("parley voice server listening on ws://{addr}/api/voice/ws");

    serve(listener, ctx, &config.cors).await
}
