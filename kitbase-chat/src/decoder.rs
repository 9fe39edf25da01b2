//! Provider wire-format decoders.
//!
//! Each decoder maps the `data` payload of one SSE event into zero or more
//! [`ProviderEvent`]s. Payloads that carry nothing the normalizer needs decode to an empty list.

use crate::error::{ChatError, ChatResult};
use crate::types::Provider;
use serde::Deserialize;

/// Provider-independent view of one upstream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Text(String),
    InputTokens(u64),
    OutputTokens(u64),
    Finish(String),
    /// Upstream signalled the end of the stream.
    Done,
}

pub fn decode(provider: Provider, data: &str) -> ChatResult<Vec<ProviderEvent>> {
    match provider {
        Provider::OpenAi => decode_openai(data),
        Provider::Anthropic => decode_anthropic(data),
    }
}

fn malformed(provider: Provider, err: serde_json::Error) -> ChatError {
    ChatError::StreamInterrupted(format!("malformed {provider} chunk: {err}"))
}

// ── OpenAI ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: Option<OpenAiDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

/// Chat-completions chunks: `data: {...}` lines ending with `data: [DONE]`.
pub fn decode_openai(data: &str) -> ChatResult<Vec<ProviderEvent>> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(vec![ProviderEvent::Done]);
    }

    let chunk: OpenAiChunk =
        serde_json::from_str(data).map_err(|e| malformed(Provider::OpenAi, e))?;
    if let Some(error) = chunk.error {
        return Err(ChatError::StreamInterrupted(error.message));
    }

    let mut events = Vec::new();
    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(text) = choice.delta.and_then(|d| d.content)
            && !text.is_empty()
        {
            events.push(ProviderEvent::Text(text));
        }
        if let Some(reason) = choice.finish_reason {
            events.push(ProviderEvent::Finish(reason));
        }
    }
    // Sent on the final chunk when `stream_options.include_usage` is set.
    if let Some(usage) = chunk.usage {
        events.push(ProviderEvent::InputTokens(usage.prompt_tokens));
        events.push(ProviderEvent::OutputTokens(usage.completion_tokens));
    }
    Ok(events)
}

// ── Anthropic ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    MessageStart {
        message: AnthropicMessage,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    MessageDelta {
        #[serde(default)]
        delta: Option<MessageDelta>,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Error {
        error: StreamError,
    },
    /// ping, content_block_start, content_block_stop, and future types.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessage {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Messages API events, discriminated by the JSON `type` field.
pub fn decode_anthropic(data: &str) -> ChatResult<Vec<ProviderEvent>> {
    let event: AnthropicEvent =
        serde_json::from_str(data).map_err(|e| malformed(Provider::Anthropic, e))?;

    let events = match event {
        AnthropicEvent::MessageStart { message } => message
            .usage
            .and_then(|u| u.input_tokens)
            .map(ProviderEvent::InputTokens)
            .into_iter()
            .collect(),
        AnthropicEvent::ContentBlockDelta {
            delta: BlockDelta::TextDelta { text },
        } if !text.is_empty() => vec![ProviderEvent::Text(text)],
        AnthropicEvent::ContentBlockDelta { .. } => Vec::new(),
        AnthropicEvent::MessageDelta { delta, usage } => {
            let mut events = Vec::new();
            if let Some(reason) = delta.and_then(|d| d.stop_reason) {
                events.push(ProviderEvent::Finish(reason));
            }
            if let Some(output) = usage.and_then(|u| u.output_tokens) {
                events.push(ProviderEvent::OutputTokens(output));
            }
            events
        }
        AnthropicEvent::MessageStop => vec![ProviderEvent::Done],
        AnthropicEvent::Error { error } => {
            return Err(ChatError::StreamInterrupted(error.message));
        }
        AnthropicEvent::Other => Vec::new(),
    };
    Ok(events)
}
