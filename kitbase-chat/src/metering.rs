//! Entitlement and metering collaborators.

use crate::error::ChatResult;
use crate::usage::UsageRecord;
use async_trait::async_trait;
use kitbase_types::Identity;
use tracing::info;

/// Gate and counter for metered features (billing plans, quotas).
#[async_trait]
pub trait Entitlements: Send + Sync {
    /// Checked before any provider call.
    async fn is_entitled(&self, feature: &str, identity: &Identity) -> ChatResult<bool>;

    /// Called once per attempted request, including failed ones.
    async fn record_usage(&self, feature: &str, identity: &Identity, amount: u64)
    -> ChatResult<()>;
}

/// Receives token usage after a stream completes successfully.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn report(&self, identity: &Identity, record: &UsageRecord);
}

/// Entitles everyone and meters nothing.
pub struct AllowAll;

#[async_trait]
impl Entitlements for AllowAll {
    async fn is_entitled(&self, _feature: &str, _identity: &Identity) -> ChatResult<bool> {
        Ok(true)
    }

    async fn record_usage(
        &self,
        _feature: &str,
        _identity: &Identity,
        _amount: u64,
    ) -> ChatResult<()> {
        Ok(())
    }
}

/// Writes usage records to the log.
pub struct LogUsageSink;

#[async_trait]
impl UsageSink for LogUsageSink {
    async fn report(&self, identity: &Identity, record: &UsageRecord) {
        info!(
            user = %identity.id,
            provider = %record.provider,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            characters = record.characters,
            duration_ms = record.duration_ms,
            "chat completion usage"
        );
    }
}
