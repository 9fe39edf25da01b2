//! Streaming chat normalizer.
//!
//! Gates a request (identity, model allow-list, entitlement), opens the
//! provider stream, and re-emits it as `metadata`, `content`..., `done`.
//! Content is forwarded chunk by chunk with no buffering beyond one network
//! read. Usage is reported to the [`UsageSink`] after a clean finish only;
//! the attempt itself is always metered through [`Entitlements`].

use crate::config::ChatConfig;
use crate::decoder::{ProviderEvent, decode};
use crate::error::{ChatError, ChatResult};
use crate::event::NormalizedEvent;
use crate::metering::{Entitlements, UsageSink};
use crate::provider::{AnthropicClient, ByteStream, CompletionClient, OpenAiClient};
use crate::types::{ChatRequest, CompletionRequest, Provider};
use crate::usage::UsageAccumulator;

use eventsource_stream::{EventStream, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use kitbase_types::{Identity, IdentityProvider};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Normalized output of one chat request.
pub type NormalizedStream = Pin<Box<dyn Stream<Item = ChatResult<NormalizedEvent>> + Send>>;

/// Collaborators the normalizer works against.
#[derive(Clone)]
pub struct ChatContext {
    pub identity: Arc<dyn IdentityProvider>,
    pub entitlements: Arc<dyn Entitlements>,
    pub usage: Arc<dyn UsageSink>,
    clients: HashMap<Provider, Arc<dyn CompletionClient>>,
}

impl ChatContext {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        entitlements: Arc<dyn Entitlements>,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            identity,
            entitlements,
            usage,
            clients: HashMap::new(),
        }
    }

    /// Registers `client` for the provider it reports.
    pub fn with_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }
}

pub struct ChatNormalizer {
    ctx: ChatContext,
    config: ChatConfig,
}

impl ChatNormalizer {
    pub fn new(ctx: ChatContext, config: ChatConfig) -> Self {
        Self { ctx, config }
    }

    /// Builds HTTP clients for both providers from `config`.
    pub fn from_config(
        config: ChatConfig,
        identity: Arc<dyn IdentityProvider>,
        entitlements: Arc<dyn Entitlements>,
        usage: Arc<dyn UsageSink>,
    ) -> ChatResult<Self> {
        let ctx = ChatContext::new(identity, entitlements, usage)
            .with_client(Arc::new(OpenAiClient::new(config.openai.clone())?))
            .with_client(Arc::new(AnthropicClient::new(config.anthropic.clone())?));
        Ok(Self::new(ctx, config))
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Validates `request` and opens the normalized stream.
    ///
    /// Rejections and upstream request failures are returned here, before
    /// any event exists. Failures after that arrive as a final `Err` item on
    /// the stream in place of [`NormalizedEvent::Done`].
    pub async fn stream(&self, request: ChatRequest) -> ChatResult<NormalizedStream> {
        let identity = self
            .ctx
            .identity
            .current_user()
            .await
            .ok_or(ChatError::Unauthorized)?;

        if !self.config.is_allowed(&request.model) {
            return Err(ChatError::UnsupportedModel(request.model));
        }

        let feature = self.config.feature.clone();
        if !self.ctx.entitlements.is_entitled(&feature, &identity).await? {
            debug!("user {} not entitled to {feature}", identity.id);
            return Err(ChatError::NotEntitled(feature));
        }

        let client = self.ctx.clients.get(&request.provider).cloned().ok_or_else(|| {
            ChatError::Config(format!("no client registered for {}", request.provider))
        })?;

        let completion = CompletionRequest {
            model: request.model.clone(),
            messages: request.messages,
            max_tokens: self.config.max_tokens,
            api_key: request.api_key,
        };
        let usage = UsageAccumulator::new(request.provider, &request.model);

        let body = match client.open_stream(&completion).await {
            Ok(body) => body,
            Err(e) => {
                warn!("{} request failed: {e}", request.provider);
                meter(self.ctx.entitlements.as_ref(), &feature, &identity).await;
                return Err(e);
            }
        };
        info!(
            "streaming {} completion for user {} (model {})",
            request.provider, identity.id, request.model
        );

        let pipeline = Pipeline {
            events: body.eventsource(),
            provider: request.provider,
            model: request.model,
            identity,
            feature,
            entitlements: Arc::clone(&self.ctx.entitlements),
            sink: Arc::clone(&self.ctx.usage),
            usage: Some(usage),
            queue: VecDeque::new(),
            phase: Phase::Metadata,
            upstream_done: false,
        };

        Ok(Box::pin(futures::stream::unfold(
            pipeline,
            |mut pipeline| async move {
                let item = pipeline.next_event().await?;
                Some((item, pipeline))
            },
        )))
    }
}

async fn meter(entitlements: &dyn Entitlements, feature: &str, identity: &Identity) {
    if let Err(e) = entitlements.record_usage(feature, identity, 1).await {
        warn!("failed to record {feature} usage for user {}: {e}", identity.id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Metadata,
    Streaming,
    Finished,
}

/// Per-request state driven by the output stream.
///
/// Owns the upstream body; dropping the output stream drops the body and
/// closes the provider connection.
struct Pipeline {
    events: EventStream<ByteStream>,
    provider: Provider,
    model: String,
    identity: Identity,
    feature: String,
    entitlements: Arc<dyn Entitlements>,
    sink: Arc<dyn UsageSink>,
    usage: Option<UsageAccumulator>,
    queue: VecDeque<NormalizedEvent>,
    phase: Phase,
    upstream_done: bool,
}

impl Pipeline {
    async fn next_event(&mut self) -> Option<ChatResult<NormalizedEvent>> {
        loop {
            match self.phase {
                Phase::Finished => return None,
                Phase::Metadata => {
                    self.phase = Phase::Streaming;
                    return Some(Ok(NormalizedEvent::Metadata {
                        model: self.model.clone(),
                    }));
                }
                Phase::Streaming => {}
            }

            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if self.upstream_done {
                return Some(Ok(self.complete().await));
            }

            match self.events.next().await {
                Some(Ok(event)) => {
                    // Keep-alive comments and bare `event:` lines carry no data.
                    if event.data.trim().is_empty() {
                        continue;
                    }
                    if let Err(e) = self.absorb(&event.data) {
                        return Some(Err(self.interrupt(e).await));
                    }
                }
                Some(Err(EventStreamError::Transport(e))) => {
                    return Some(Err(self.interrupt(e).await));
                }
                Some(Err(e)) => {
                    let err = ChatError::StreamInterrupted(format!("invalid event stream: {e}"));
                    return Some(Err(self.interrupt(err).await));
                }
                // A body that ends without a sentinel still counts as complete.
                None => self.upstream_done = true,
            }
        }
    }

    fn absorb(&mut self, data: &str) -> ChatResult<()> {
        if self.upstream_done {
            return Ok(());
        }
        for event in decode(self.provider, data)? {
            if let Some(usage) = self.usage.as_mut() {
                usage.observe(&event);
            }
            match event {
                ProviderEvent::Text(text) => self.queue.push_back(NormalizedEvent::content(text)),
                ProviderEvent::Done => self.upstream_done = true,
                _ => {}
            }
        }
        Ok(())
    }

    async fn complete(&mut self) -> NormalizedEvent {
        self.phase = Phase::Finished;
        if let Some(usage) = self.usage.take() {
            let record = usage.finish();
            debug!(
                "{} stream finished: {} chars, {} tokens",
                self.provider, record.characters, record.total_tokens
            );
            self.sink.report(&self.identity, &record).await;
        }
        meter(self.entitlements.as_ref(), &self.feature, &self.identity).await;
        NormalizedEvent::Done
    }

    /// Ends the stream with an error. Partial usage is dropped unreported.
    async fn interrupt(&mut self, err: ChatError) -> ChatError {
        self.phase = Phase::Finished;
        self.queue.clear();
        let partial = self.usage.take().map(|u| u.characters()).unwrap_or_default();
        warn!(
            "{} stream interrupted after {partial} chars: {err}",
            self.provider
        );
        meter(self.entitlements.as_ref(), &self.feature, &self.identity).await;
        match err {
            ChatError::StreamInterrupted(_) => err,
            other => ChatError::StreamInterrupted(other.to_string()),
        }
    }
}
