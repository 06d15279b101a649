use thiserror::Error;

/// Errors surfaced by external collaborators.
///
/// The pipeline never propagates these past a stage boundary; each one is
/// turned into an `error` control message.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The backing engine is not configured or not reachable.
    #[error("{0} is unavailable")]
    Unavailable(String),

    /// Upstream answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Network or I/O failure talking to the engine.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The engine answered with something we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}
