//! Streaming completion clients for OpenAI-compatible and Anthropic APIs.
//!
//! A client only opens the request and hands back the raw SSE byte stream;
//! decoding and normalization happen in [`crate::normalizer`].

use crate::config::ProviderConfig;
use crate::error::{ChatError, ChatResult};
use crate::types::{ChatMessage, CompletionRequest, ContentPart, MessageContent, Provider, Role};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{Value, json};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Raw response body of a streaming completion.
pub type ByteStream = Pin<Box<dyn Stream<Item = ChatResult<Bytes>> + Send>>;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Sends the streaming request. A non-success status fails here, before
    /// any body bytes are handed out.
    async fn open_stream(&self, request: &CompletionRequest) -> ChatResult<ByteStream>;
}

fn build_http_client(config: &ProviderConfig) -> ChatResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
        .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))
}

fn resolve_key(
    provider: Provider,
    request: &CompletionRequest,
    config: &ProviderConfig,
) -> ChatResult<String> {
    request
        .api_key
        .clone()
        .or_else(|| config.api_key.clone())
        .ok_or_else(|| ChatError::Config(format!("no API key configured for {provider}")))
}

async fn into_byte_stream(resp: reqwest::Response) -> ChatResult<ByteStream> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ChatError::UpstreamRequestFailed {
            status: status.as_u16(),
            body,
        });
    }

    let stream = resp
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| ChatError::StreamInterrupted(e.to_string())));
    Ok(Box::pin(stream))
}

/// Inlines text-like files; other binaries become a note, since neither
/// chat API accepts arbitrary files in messages.
fn file_as_text(name: &str, mime_type: &str, data: &str) -> String {
    let is_text = mime_type.starts_with("text/")
        || mime_type == "application/json"
        || mime_type == "application/xml";
    if is_text
        && let Ok(bytes) = STANDARD.decode(data)
        && let Ok(text) = String::from_utf8(bytes)
    {
        return format!("[{name}]\n{text}");
    }
    format!("[Attached file: {name} ({mime_type})]")
}

// ── OpenAI ──────────────────────────────────────────────────────

pub struct OpenAiClient {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiClient {
    pub fn new(config: ProviderConfig) -> ChatResult<Self> {
        Ok(Self {
            client: build_http_client(&config)?,
            config,
        })
    }
}

/// Converts messages to the chat-completions shape.
pub fn openai_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let content = match &msg.content {
                MessageContent::Text(text) => Value::String(text.clone()),
                MessageContent::Parts(parts) => {
                    Value::Array(parts.iter().map(openai_part).collect())
                }
            };
            json!({ "role": role, "content": content })
        })
        .collect()
}

fn openai_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
        ContentPart::Image { mime_type, data } => json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{mime_type};base64,{data}") }
        }),
        ContentPart::File {
            name,
            mime_type,
            data,
        } => json!({ "type": "text", "text": file_as_text(name, mime_type, data) }),
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn open_stream(&self, request: &CompletionRequest) -> ChatResult<ByteStream> {
        let key = resolve_key(Provider::OpenAi, request, &self.config)?;
        let url = format!("{}/chat/completions", self.config.base_url);
        debug!("opening openai stream for model {}", request.model);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&json!({
                "model": request.model,
                "messages": openai_messages(&request.messages),
                "stream": true,
                "stream_options": { "include_usage": true },
            }))
            .send()
            .await?;

        into_byte_stream(resp).await
    }
}

// ── Anthropic ───────────────────────────────────────────────────

pub struct AnthropicClient {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicClient {
    pub fn new(config: ProviderConfig) -> ChatResult<Self> {
        Ok(Self {
            client: build_http_client(&config)?,
            config,
        })
    }
}

/// Converts messages to the Messages API shape. System messages are joined
/// into the top-level `system` field.
pub fn anthropic_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system: Option<String> = None;
    let mut converted = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::System => {
                let text = msg.text();
                system = Some(match system {
                    Some(existing) => format!("{existing}\n\n{text}"),
                    None => text,
                });
                continue;
            }
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let content = match &msg.content {
            MessageContent::Text(text) => Value::String(text.clone()),
            MessageContent::Parts(parts) => {
                Value::Array(parts.iter().map(anthropic_part).collect())
            }
        };
        converted.push(json!({ "role": role, "content": content }));
    }

    (system, converted)
}

fn anthropic_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
        ContentPart::Image { mime_type, data } => json!({
            "type": "image",
            "source": { "type": "base64", "media_type": mime_type, "data": data }
        }),
        ContentPart::File {
            name,
            mime_type,
            data,
        } => json!({ "type": "text", "text": file_as_text(name, mime_type, data) }),
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn open_stream(&self, request: &CompletionRequest) -> ChatResult<ByteStream> {
        let key = resolve_key(Provider::Anthropic, request, &self.config)?;
        let url = format!("{}/messages", self.config.base_url);
        let (system, messages) = anthropic_messages(&request.messages);
        debug!("opening anthropic stream for model {}", request.model);

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
            "stream": true,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        into_byte_stream(resp).await
    }
}
