//! Normalized events and their SSE wire encoding.
//!
//! Both providers produce the same frames:
//! `data: {"type":"metadata",...}`, `data: {"type":"content",...}`, then a
//! literal `data: [DONE]`.

use crate::error::{ChatError, ChatResult};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Provider-independent stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NormalizedEvent {
    /// First event; echoes the resolved model.
    Metadata { model: String },
    /// Incremental assistant text.
    Content { content: String },
    /// Terminal sentinel.
    Done,
}

impl NormalizedEvent {
    pub fn content(text: impl Into<String>) -> Self {
        NormalizedEvent::Content {
            content: text.into(),
        }
    }

    pub fn to_sse_frame(&self) -> ChatResult<String> {
        match self {
            NormalizedEvent::Done => Ok(DONE_FRAME.to_string()),
            event => Ok(format!("data: {}\n\n", serde_json::to_string(event)?)),
        }
    }
}

/// Encodes a normalized stream as an SSE response body.
///
/// Errors are passed through so the HTTP layer can abort the response
/// instead of writing a terminal frame.
pub fn sse_body<S>(events: S) -> impl Stream<Item = ChatResult<Bytes>> + Send
where
    S: Stream<Item = ChatResult<NormalizedEvent>> + Send,
{
    events.map(|event| event.and_then(|e| e.to_sse_frame()).map(Bytes::from))
}

/// Parses one frame produced by [`NormalizedEvent::to_sse_frame`].
pub fn parse_sse_frame(frame: &str) -> ChatResult<NormalizedEvent> {
    let data = frame
        .trim_end()
        .strip_prefix("data: ")
        .ok_or_else(|| ChatError::StreamInterrupted(format!("not an SSE data frame: {frame:?}")))?;
    if data == "[DONE]" {
        return Ok(NormalizedEvent::Done);
    }
    Ok(serde_json::from_str(data)?)
}
