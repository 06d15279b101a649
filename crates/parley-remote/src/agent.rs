//! Streaming chat-completions agent with per-session memory.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use parley_core::{AgentRunner, CollaboratorError, TextStream};
use serde::Serialize;

use crate::config::{RemoteConfig, RemoteEndpoint};
use crate::http;
use crate::sse;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// End-user identifier for upstream abuse tracking / caching.
    user: String,
}

type Histories = Arc<Mutex<HashMap<String, VecDeque<ChatMessage>>>>;

/// `POST /chat/completions` with `stream: true`.
pub struct RemoteAgent {
    client: reqwest::Client,
    endpoint: RemoteEndpoint,
    system_prompt: Option<String>,
    max_history: usize,
    histories: Histories,
}

impl RemoteAgent {
    pub fn new(config: &RemoteConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            // No whole-request timeout: a long answer may stream for minutes.
            client: http::build_client(config.connect_timeout(), None)?,
            endpoint: config.chat.clone(),
            system_prompt: config.system_prompt.clone().filter(|p| !p.trim().is_empty()),
            max_history: config.max_history_messages,
            histories: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Forget everything said in `session_key`.
    pub fn clear_session(&self, session_key: &str) {
        lock(&self.histories).remove(session_key);
    }

    /// Number of remembered messages for `session_key`.
    pub fn history_len(&self, session_key: &str) -> usize {
        lock(&self.histories).get(session_key).map_or(0, VecDeque::len)
    }

    fn messages_for(&self, session_key: &str, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::new("system", system.as_str()));
        }
        if let Some(history) = lock(&self.histories).get(session_key) {
            messages.extend(history.iter().cloned());
        }
        messages.push(ChatMessage::new("user", prompt));
        messages
    }
}

fn lock(
    histories: &Histories,
) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<ChatMessage>>> {
    histories.lock().unwrap_or_else(PoisonError::into_inner)
}

fn remember(histories: &Histories, session_key: &str, max: usize, turn: [ChatMessage; 2]) {
    if max == 0 {
        return;
    }
    let mut map = lock(histories);
    let history = map.entry(session_key.to_owned()).or_default();
    history.extend(turn);
    while history.len() > max {
        history.pop_front();
    }
}

#[async_trait]
impl AgentRunner for RemoteAgent {
    async fn run(
        &self,
        session_key: &str,
        prompt: &str,
        channel: &str,
    ) -> Result<TextStream, CollaboratorError> {
        let body = ChatRequest {
            model: &self.endpoint.model,
            messages: self.messages_for(session_key, prompt),
            stream: true,
            user: format!("{channel}:{session_key}"),
        };
        tracing::debug!(
            session = session_key,
            messages = body.messages.len(),
            "Starting chat completion"
        );

        let response = http::send(
            http::post(&self.client, &self.endpoint, "chat/completions").json(&body),
        )
        .await?;

        let histories = Arc::clone(&self.histories);
        let session_key = session_key.to_owned();
        let prompt = prompt.to_owned();
        let max_history = self.max_history;
        let on_complete: sse::OnComplete = Box::new(move |reply: String| {
            if reply.trim().is_empty() {
                return;
            }
            remember(
                &histories,
                &session_key,
                max_history,
                [
                    ChatMessage::new("user", prompt),
                    ChatMessage::new("assistant", reply),
                ],
            );
        });

        Ok(Box::pin(sse::text_fragments(
            response.bytes_stream(),
            on_complete,
        )))
    }
}
