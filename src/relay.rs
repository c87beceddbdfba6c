//! Streaming relay.
//!
//! Forwards an upstream completion token stream to the caller as
//! [`StreamEvent`]s. One relay per inbound request; no shared state.
//!
//! The relay is a pull-driven stream: each poll reads at most the next
//! upstream chunk, so memory stays bounded for long answers. If the caller
//! goes away the transport drops the relay, which drops the upstream body
//! and releases its connection; nothing keeps reading in the background.
//!
//! Termination rules:
//! - `data: [DONE]` upstream → `Done`, and the rest of the upstream is never read.
//! - Upstream error mid-stream → `{error}` then `Done`.
//! - Upstream ends without the sentinel → `Done`.
//! - Malformed JSON frames are skipped.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;

use crate::sse::{Frame, SseDecoder, StreamEvent};

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    choices: Vec<EnvelopeChoice>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct EnvelopeChoice {
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Extract the incremental text carried by one frame payload.
///
/// Accepts the completion backend's `choices[0].delta.content` shape as well
/// as a bare `{"content": ...}` frame. Returns `None` for malformed JSON and
/// for frames without text.
pub fn extract_delta(payload: &str) -> Option<String> {
    let envelope: Envelope = serde_json::from_str(payload).ok()?;
    let text = envelope
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .or(envelope.content)?;
    (!text.is_empty()).then_some(text)
}

/// Relay an upstream byte stream as caller events.
pub fn relay<S, B, E>(upstream: S) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut upstream = Box::pin(upstream);

        while let Some(chunk) = upstream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(error = %err, "upstream stream failed");
                    yield StreamEvent::Error(err.to_string());
                    yield StreamEvent::Done;
                    return;
                }
            };

            for frame in decoder.push(bytes.as_ref()) {
                match frame {
                    Frame::Done => {
                        yield StreamEvent::Done;
                        return;
                    }
                    Frame::Data(payload) => {
                        if let Some(text) = extract_delta(&payload) {
                            yield StreamEvent::Content(text);
                        }
                    }
                }
            }
        }

        if let Some(Frame::Data(payload)) = decoder.finish() {
            if let Some(text) = extract_delta(&payload) {
                yield StreamEvent::Content(text);
            }
        }
        yield StreamEvent::Done;
    }
}

/// The two-event stream sent when the upstream could not be started.
pub fn failure(message: impl Into<String>) -> BoxStream<'static, StreamEvent> {
    stream::iter(vec![StreamEvent::Error(message.into()), StreamEvent::Done]).boxed()
}
