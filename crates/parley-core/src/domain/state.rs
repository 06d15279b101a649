//! Conversation state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The single authoritative conversation state of one connection.
///
/// Serialized as a lowercase string (`"listening"`, `"speaking"`, ...) both in
/// control messages and relay envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    /// Connection not started (or already torn down).
    #[default]
    Idle,
    /// Waiting for the user to speak.
    Listening,
    /// An utterance was transcribed and the agent is producing a reply.
    Processing,
    /// Synthesized audio is being sent to the client.
    Speaking,
    /// Barge-in in progress; always resolves to `Listening`.
    Interrupting,
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid state transition: {from} -> {to}")]
pub struct StateTransitionError {
    pub from: ConversationState,
    pub to: ConversationState,
}

impl ConversationState {
    /// Wire label for this state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Interrupting => "interrupting",
        }
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Any state may return to `Idle` when the connection ends.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Idle)
                | (Self::Idle | Self::Processing | Self::Speaking | Self::Interrupting, Self::Listening)
                | (Self::Listening, Self::Processing)
                | (Self::Processing, Self::Speaking)
                | (Self::Speaking, Self::Interrupting)
        )
    }

    /// Validate and return the next state.
    pub const fn transition(self, next: Self) -> Result<Self, StateTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StateTransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
