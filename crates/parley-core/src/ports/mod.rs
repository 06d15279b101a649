//! Collaborator ports consumed by the voice pipeline.
//!
//! # Design Rules
//!
//! - The pipeline only ever talks to these traits; concrete engines live in
//!   adapter crates (`parley-remote`) or in tests.
//! - Every method is safe to call serially from one connection. Engines that
//!   need internal locking provide it themselves.

mod collaborators;
mod error;
mod ui;

pub use collaborators::{AgentRunner, SynthesisRequest, Synthesizer, TextStream, Transcriber};
pub use error::CollaboratorError;
pub use ui::{NoopBroadcast, UiBroadcast, UiEvent};
