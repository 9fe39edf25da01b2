//! Streaming chat normalizer for Kitbase.
//!
//! Turns OpenAI chat-completions and Anthropic Messages streams into one
//! provider-independent SSE stream:
//! - Request gating (identity, model allow-list, entitlements) before any
//!   provider call
//! - Incremental SSE decoding that forwards each text delta as it arrives
//! - Usage accounting reported after a clean finish, metering on every attempt

pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod metering;
pub mod normalizer;
pub mod provider;
pub mod types;
pub mod usage;

pub use config::{ChatConfig, ProviderConfig};
pub use decoder::{ProviderEvent, decode};
pub use error::{ChatError, ChatResult};
pub use event::{DONE_FRAME, NormalizedEvent, parse_sse_frame, sse_body};
pub use metering::{AllowAll, Entitlements, LogUsageSink, UsageSink};
pub use normalizer::{ChatContext, ChatNormalizer, NormalizedStream};
pub use provider::{AnthropicClient, ByteStream, CompletionClient, OpenAiClient};
pub use types::{
    Attachment, AttachmentKind, ChatMessage, ChatRequest, ChatSession, CompletionRequest,
    ContentPart, MessageContent, Provider, Role, SessionMessage,
};
pub use usage::{UsageAccumulator, UsageRecord};
