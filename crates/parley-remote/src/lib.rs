#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

mod agent;
mod config;
mod http;
mod sse;
mod synthesizer;
mod transcriber;
pub mod wav;

pub use agent::RemoteAgent;
pub use config::{RemoteCollaborators, RemoteConfig, RemoteEndpoint};
pub use synthesizer::RemoteSynthesizer;
pub use transcriber::RemoteTranscriber;

#[cfg(test)]
use axum as _;
#[cfg(test)]
use tokio as _;
