//! Chat streaming error types.

use thiserror::Error;

/// Result type for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors surfaced to the chat caller.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("authentication required")]
    Unauthorized,

    #[error("not entitled to feature: {0}")]
    NotEntitled(String),

    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// The provider answered the initial request with a non-success status.
    #[error("upstream request failed with status {status}: {body}")]
    UpstreamRequestFailed { status: u16, body: String },

    /// The stream broke after it started (transport error, malformed frame,
    /// or an in-band provider error).
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ChatError {
    /// True for errors raised before any provider request was sent.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ChatError::Unauthorized | ChatError::NotEntitled(_) | ChatError::UnsupportedModel(_)
        )
    }
}
