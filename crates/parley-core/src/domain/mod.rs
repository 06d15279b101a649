//! Domain types shared across the voice pipeline and its adapters.

mod control;
mod relay;
mod state;

pub use control::{ControlKind, ControlMessage};
pub use relay::{RelayEnvelope, RelayKind};
pub use state::{ConversationState, StateTransitionError};
