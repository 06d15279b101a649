//! Control-message wire format.
//!
//! Control messages travel as JSON text alongside binary audio frames on the
//! same logical connection. Only the fields relevant to `type` are populated;
//! everything else is omitted from the serialized object.

use serde::{Deserialize, Serialize};

use super::state::ConversationState;

/// Discriminator of a [`ControlMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    State,
    Transcript,
    Config,
    VadState,
    Error,
    Wake,
    Interrupt,
}

/// Side-channel control record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConversationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_speech: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

impl ControlMessage {
    const fn bare(kind: ControlKind) -> Self {
        Self {
            kind,
            state: None,
            text: None,
            is_speech: None,
            sample_rate: None,
            voice: None,
        }
    }

    pub fn state(state: ConversationState) -> Self {
        Self {
            state: Some(state),
            ..Self::bare(ControlKind::State)
        }
    }

    pub fn transcript(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::bare(ControlKind::Transcript)
        }
    }

    pub fn vad_state(is_speech: bool) -> Self {
        Self {
            is_speech: Some(is_speech),
            ..Self::bare(ControlKind::VadState)
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::bare(ControlKind::Error)
        }
    }

    /// Wake-word detection; `text` carries the matched transcript.
    pub fn wake(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::bare(ControlKind::Wake)
        }
    }

    pub const fn interrupt() -> Self {
        Self::bare(ControlKind::Interrupt)
    }

    /// Output configuration; either field may be omitted.
    pub fn config(sample_rate: Option<u32>, voice: Option<String>) -> Self {
        Self {
            sample_rate,
            voice,
            ..Self::bare(ControlKind::Config)
        }
    }

    /// Parse a text frame. Malformed input yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> String {
        // Only strings, bools, integers and unit enums: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
