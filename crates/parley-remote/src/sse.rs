//! OpenAI chat-completion SSE → text fragments.
//!
//! Upstream format, one event per `data:` line:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```

use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, stream::BoxStream};

/// Called once with the full reply text when the stream ends, however it ends
/// (`[DONE]`, upstream EOF or a transport error). Not called if the consumer
/// drops the stream first.
pub(crate) type OnComplete = Box<dyn FnOnce(String) + Send>;

struct State<E> {
    stream: BoxStream<'static, Result<Bytes, E>>,
    buf: BytesMut,
    reply: String,
    done: bool,
    on_complete: Option<OnComplete>,
}

impl<E> State<E> {
    fn finish(&mut self) {
        self.done = true;
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(std::mem::take(&mut self.reply));
        }
    }
}

/// What one SSE line means for the fragment stream.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Fragment(String),
    Done,
    Skip,
}

fn parse_line(line: &str) -> Line {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Line::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Line::Done;
    }
    let Ok(chunk) = serde_json::from_str::<serde_json::Value>(data) else {
        tracing::debug!(data, "Skipping unparseable SSE chunk");
        return Line::Skip;
    };
    match chunk["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => Line::Fragment(content.to_owned()),
        _ => Line::Skip,
    }
}

fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|i| i + 1)
}

/// Turn an SSE byte stream into the text fragments it carries.
pub(crate) fn text_fragments<S, E>(
    byte_stream: S,
    on_complete: OnComplete,
) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = State {
        stream: byte_stream.boxed(),
        buf: BytesMut::new(),
        reply: String::new(),
        done: false,
        on_complete: Some(on_complete),
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        loop {
            if let Some(line_end) = find_newline(&st.buf) {
                let line = st.buf.split_to(line_end);
                match parse_line(&String::from_utf8_lossy(&line)) {
                    Line::Fragment(text) => {
                        st.reply.push_str(&text);
                        return Some((text, st));
                    }
                    Line::Done => {
                        st.finish();
                        return None;
                    }
                    Line::Skip => continue,
                }
            }

            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Chat stream failed mid-response");
                    st.finish();
                    return None;
                }
                None => {
                    // Unterminated last line.
                    let rest = st.buf.split();
                    let tail = match parse_line(&String::from_utf8_lossy(&rest)) {
                        Line::Fragment(text) => Some(text),
                        Line::Done | Line::Skip => None,
                    };
                    if let Some(text) = &tail {
                        st.reply.push_str(text);
                    }
                    st.finish();
                    return tail.map(|text| (text, st));
                }
            }
        }
    })
}
