#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod ports;
pub mod settings;

pub use domain::{
    ControlKind, ControlMessage, ConversationState, RelayEnvelope, RelayKind, StateTransitionError,
};
pub use ports::{
    AgentRunner, CollaboratorError, NoopBroadcast, SynthesisRequest, Synthesizer, TextStream,
    Transcriber, UiBroadcast, UiEvent,
};
pub use settings::{
    GateSettings, KeepAliveSettings, PlaybackSettings, QueueSettings, SegmenterSettings,
    SettingsError, UtteranceSettings, VadSettings, VoiceSettings, WakeSettings, validate_settings,
};

#[cfg(test)]
use futures_util as _;
#[cfg(test)]
use tokio_test as _;
