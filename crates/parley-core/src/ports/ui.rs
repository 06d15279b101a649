use serde::Serialize;

/// Display-only events mirrored to a UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// A transcribed user utterance.
    UserUtterance { session_key: String, text: String },
    /// One streamed fragment of the agent's reply.
    ResponseFragment { session_key: String, text: String },
    /// The agent's reply stream ended.
    ResponseComplete { session_key: String },
}

/// Optional fan-out sink for UI display.
///
/// Implementations must not block and must swallow their own failures: the
/// voice pipeline never observes whether a publish succeeded.
pub trait UiBroadcast: Send + Sync {
    fn publish(&self, event: UiEvent);
}

/// Broadcast sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroadcast;

impl UiBroadcast for NoopBroadcast {
    fn publish(&self, _event: UiEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_event_is_tagged() {
        let json = serde_json::to_string(&UiEvent::ResponseComplete {
            session_key: "abc".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"response_complete","session_key":"abc"}"#);
    }
}
