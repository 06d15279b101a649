//! Voice pipeline error types.

use std::path::PathBuf;

use parley_core::CollaboratorError;

/// Errors that can occur in the voice pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Model file not found at expected path.
    #[error("Voice model not found at {0}")]
    ModelNotFound(PathBuf),

    /// Failed to load an inference model.
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    /// A single inference call failed.
    #[error("Inference failed: {0}")]
    InferenceError(String),

    /// Audio payload could not be decoded.
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    /// Reading from or writing to the peer failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer went away.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A collaborator (ASR, TTS, agent) failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// IO error (model files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation was cancelled.
    #[error("Voice operation cancelled")]
    Cancelled,
}
