//! Chat message model and request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream completion provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Base64-encoded image.
    Image {
        mime_type: String,
        data: String,
    },
    /// Base64-encoded file.
    File {
        name: String,
        mime_type: String,
        data: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A flattened message as sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Text,
    Binary,
}

/// A file attached to a session message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// UTF-8 text for `Text` attachments, base64 otherwise.
    pub data: String,
}

impl Attachment {
    fn into_part(self) -> ContentPart {
        match self.kind {
            AttachmentKind::Image => ContentPart::Image {
                mime_type: self.mime_type,
                data: self.data,
            },
            AttachmentKind::Text => ContentPart::Text {
                text: format!("[{}]\n{}", self.name, self.data),
            },
            AttachmentKind::Binary => ContentPart::File {
                name: self.name,
                mime_type: self.mime_type,
                data: self.data,
            },
        }
    }
}

/// A message as kept in a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
}

impl SessionMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Flattens text and attachments (in order) into a provider message.
    pub fn to_chat_message(&self) -> ChatMessage {
        if self.attachments.is_empty() {
            return ChatMessage {
                role: self.role,
                content: MessageContent::Text(self.content.clone()),
            };
        }

        let mut parts = Vec::with_capacity(self.attachments.len() + 1);
        if !self.content.is_empty() {
            parts.push(ContentPart::Text {
                text: self.content.clone(),
            });
        }
        parts.extend(self.attachments.iter().cloned().map(Attachment::into_part));
        ChatMessage {
            role: self.role,
            content: MessageContent::Parts(parts),
        }
    }
}

/// An ordered conversation owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub messages: Vec<SessionMessage>,
}

impl ChatSession {
    pub fn push(&mut self, message: SessionMessage) {
        self.messages.push(message);
    }

    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(SessionMessage::to_chat_message).collect()
    }
}

/// A caller's streaming chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub provider: Provider,
    /// Caller-supplied key overriding the server-side one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// What a [`crate::provider::CompletionClient`] is asked to stream.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub api_key: Option<String>,
}
