//! HTTP request handlers for the Axum web server.
//!
//! Each socket endpoint validates the query string and takes a connection
//! slot *before* upgrading, so a rejected client gets a plain HTTP error.

pub mod health;
pub mod relay;
pub mod voice;
pub mod wake;

use std::sync::Arc;

use parley_voice::{Transport, VoiceConnection};
use serde::Deserialize;

use crate::bootstrap::ConnectionSlot;
use crate::error::HttpError;
use crate::state::AppState;

const MAX_SESSION_KEY_LEN: usize = 128;

/// Query parameters accepted by every socket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Session key the agent uses to group turns. Generated when absent.
    pub session: Option<String>,
}

impl ConnectQuery {
    /// The validated session key, or a fresh UUID when none was given.
    pub fn session_key(&self) -> Result<String, HttpError> {
        match self.session.as_deref().map(str::trim) {
            None | Some("") => Ok(uuid::Uuid::new_v4().to_string()),
            Some(key) if is_valid_session_key(key) => Ok(key.to_owned()),
            Some(_) => Err(HttpError::BadRequest(format!(
                "session must be at most {MAX_SESSION_KEY_LEN} characters of [A-Za-z0-9._:-]"
            ))),
        }
    }
}

fn is_valid_session_key(key: &str) -> bool {
    key.len() <= MAX_SESSION_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
}

/// Reserve a connection slot or refuse the upgrade.
pub(crate) fn acquire_slot(state: &AppState) -> Result<ConnectionSlot, HttpError> {
    if state.shutdown.is_cancelled() {
        return Err(HttpError::ServiceUnavailable("server is shutting down".into()));
    }
    state
        .connections
        .try_acquire(state.max_connections)
        .ok_or_else(|| {
            tracing::warn!(
                limit = state.max_connections,
                "Connection limit reached, refusing socket"
            );
            HttpError::ServiceUnavailable("too many voice connections".into())
        })
}

/// Run one voice conversation over `transport` until it ends or the server
/// shuts down.
pub(crate) async fn run_connection(
    state: &AppState,
    session_key: String,
    transport: Arc<dyn Transport>,
) {
    let connection = VoiceConnection::new(
        session_key,
        state.settings.clone(),
        state.deps.clone(),
        transport,
    );

    let token = connection.cancellation_token();
    let shutdown = state.shutdown.clone();
    let link = tokio::spawn(async move {
        tokio::select! {
            () = shutdown.cancelled() => token.cancel(),
            () = token.cancelled() => {}
        }
    });

    connection.run().await;
    link.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(session: Option<&str>) -> ConnectQuery {
        ConnectQuery {
            session: session.map(str::to_owned),
        }
    }

    #[test]
    fn explicit_session_key_is_kept() {
        assert_eq!(
            query(Some("kitchen:user-1.a_b")).session_key().unwrap(),
            "kitchen:user-1.a_b"
        );
    }

    #[test]
    fn missing_or_blank_session_gets_a_uuid() {
        for q in [query(None), query(Some("   "))] {
            let key = q.session_key().unwrap();
            assert!(uuid::Uuid::parse_str(&key).is_ok(), "{key}");
        }
        assert_ne!(
            query(None).session_key().unwrap(),
            query(None).session_key().unwrap()
        );
    }

    #[test]
    fn invalid_session_keys_are_rejected() {
        let long = "a".repeat(MAX_SESSION_KEY_LEN + 1);
        for bad in ["has space", "slash/es", "emoji🎤", long.as_str()] {
            assert!(
                matches!(query(Some(bad)).session_key(), Err(HttpError::BadRequest(_))),
                "{bad}"
            );
        }
        let max = "a".repeat(MAX_SESSION_KEY_LEN);
        assert!(query(Some(&max)).session_key().is_ok());
    }
}
