#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod error;
pub mod gate;
pub mod markdown;
pub mod pcm;
pub mod pipeline;
pub mod queue;
pub mod segmenter;
pub mod transport;
pub mod vad;
pub mod wakeword;

// Re-export key types for convenience
pub use error::VoiceError;
pub use gate::NoiseGate;
pub use pipeline::{ConnectionDeps, VoiceConnection};
pub use queue::StageQueue;
pub use segmenter::Segmenter;
pub use transport::{ControlHandler, InboundQueue, OutboundAudio, OutboundQueue, Transport};
pub use transport::relay::{RelayInbox, RelayOutbound, RelayTransport};
pub use vad::{
    EnergyVad, EnergyVadProvider, VadProvider, VoiceActivityDetector, select_vad_provider,
};
pub use wakeword::{WakeCallback, WakeWordListener, matches_wake_phrase};

#[cfg(test)]
use tokio_test as _;
