//! Per-request usage accounting.

use crate::decoder::ProviderEvent;
use crate::types::Provider;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Usage of one completed completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider: Provider,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// Characters of assistant text emitted to the caller.
    pub characters: u64,
    pub finish_reason: Option<String>,
    pub duration_ms: u64,
}

/// Collects usage from decoded provider events as they stream by.
#[derive(Debug)]
pub struct UsageAccumulator {
    provider: Provider,
    model: String,
    input_tokens: u64,
    output_tokens: u64,
    characters: u64,
    finish_reason: Option<String>,
    started: Instant,
}

impl UsageAccumulator {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            characters: 0,
            finish_reason: None,
            started: Instant::now(),
        }
    }

    pub fn observe(&mut self, event: &ProviderEvent) {
        match event {
            ProviderEvent::Text(text) => self.characters += text.chars().count() as u64,
            ProviderEvent::InputTokens(n) => self.input_tokens = *n,
            // Anthropic reports a cumulative count on each message_delta.
            ProviderEvent::OutputTokens(n) => self.output_tokens = *n,
            ProviderEvent::Finish(reason) => self.finish_reason = Some(reason.clone()),
            ProviderEvent::Done => {}
        }
    }

    pub fn characters(&self) -> u64 {
        self.characters
    }

    pub fn finish(self) -> UsageRecord {
        UsageRecord {
            provider: self.provider,
            model: self.model,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_tokens: self.input_tokens + self.output_tokens,
            characters: self.characters,
            finish_reason: self.finish_reason,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
