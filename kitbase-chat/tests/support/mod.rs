//! Shared test doubles for the chat normalizer tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use kitbase_chat::{
    ByteStream, ChatConfig, ChatContext, ChatError, ChatMessage, ChatNormalizer, ChatRequest,
    ChatResult, CompletionClient, CompletionRequest, Entitlements, NormalizedEvent, Provider,
    UsageRecord, UsageSink,
};
use kitbase_types::{Identity, StaticIdentity};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Scripted client ─────────────────────────────────────────────

/// One step of a scripted response body.
#[derive(Debug, Clone)]
pub enum Step {
    Data(String),
    /// Transport failure mid-body.
    Fail(String),
}

/// Sets a flag when the response body is dropped.
struct BodyGuard(Arc<AtomicBool>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Completion client that replays a script instead of calling a provider.
pub struct ScriptedClient {
    provider: Provider,
    script: Vec<Step>,
    channel: Mutex<Option<mpsc::UnboundedReceiver<ChatResult<Bytes>>>>,
    reject: Option<(u16, String)>,
    /// Keep the body open after the script runs out.
    hang: bool,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<CompletionRequest>>,
    pub body_dropped: Arc<AtomicBool>,
}

impl ScriptedClient {
    pub fn new(provider: Provider, script: Vec<Step>) -> Self {
        Self {
            provider,
            script,
            channel: Mutex::new(None),
            reject: None,
            hang: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            body_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Body bytes are fed by the test through the returned sender.
    pub fn channel(provider: Provider) -> (Self, mpsc::UnboundedSender<ChatResult<Bytes>>) {
        let (tx, rx) = mpsc::unbounded();
        let client = Self::new(provider, Vec::new());
        *client.channel.lock().unwrap() = Some(rx);
        (client, tx)
    }

    pub fn rejecting(provider: Provider, status: u16, body: &str) -> Self {
        Self {
            reject: Some((status, body.to_string())),
            ..Self::new(provider, Vec::new())
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn was_dropped(&self) -> bool {
        self.body_dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn open_stream(&self, request: &CompletionRequest) -> ChatResult<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some((status, body)) = &self.reject {
            return Err(ChatError::UpstreamRequestFailed {
                status: *status,
                body: body.clone(),
            });
        }

        let guard = BodyGuard(Arc::clone(&self.body_dropped));
        if let Some(rx) = self.channel.lock().unwrap().take() {
            return Ok(Box::pin(rx.map(move |item| {
                let _guard = &guard;
                item
            })));
        }

        let items = self.script.clone().into_iter().map(|step| match step {
            Step::Data(data) => Ok(Bytes::from(data)),
            Step::Fail(reason) => Err(ChatError::StreamInterrupted(reason)),
        });
        let body = futures::stream::iter(items);
        let body: ByteStream = if self.hang {
            Box::pin(body.chain(futures::stream::pending()))
        } else {
            Box::pin(body)
        };
        Ok(Box::pin(body.map(move |item| {
            let _guard = &guard;
            item
        })))
    }
}

// ── Metering doubles ────────────────────────────────────────────

pub struct MockEntitlements {
    entitled: bool,
    pub checks: AtomicUsize,
    pub recorded: Mutex<Vec<(String, String, u64)>>,
}

impl MockEntitlements {
    pub fn allowing() -> Self {
        Self {
            entitled: true,
            checks: AtomicUsize::new(0),
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn denying() -> Self {
        Self {
            entitled: false,
            ..Self::allowing()
        }
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<(String, String, u64)> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Entitlements for MockEntitlements {
    async fn is_entitled(&self, _feature: &str, _identity: &Identity) -> ChatResult<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.entitled)
    }

    async fn record_usage(&self, feature: &str, identity: &Identity, amount: u64) -> ChatResult<()> {
        self.recorded
            .lock()
            .unwrap()
            .push((feature.to_string(), identity.id.clone(), amount));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<UsageRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageSink for RecordingSink {
    async fn report(&self, _identity: &Identity, record: &UsageRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

// ── Harness ─────────────────────────────────────────────────────

pub fn alice() -> Identity {
    Identity::new("9f1c2a7e-0000-4000-8000-000000000001", "alice@example.com")
}

/// Routes normalizer logs to the test writer; set `RUST_LOG=kitbase_chat=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub normalizer: ChatNormalizer,
    pub client: Arc<ScriptedClient>,
    pub entitlements: Arc<MockEntitlements>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(client: ScriptedClient) -> Harness {
    harness_with(client, MockEntitlements::allowing(), Some(alice()))
}

pub fn harness_with(
    client: ScriptedClient,
    entitlements: MockEntitlements,
    user: Option<Identity>,
) -> Harness {
    init_tracing();
    let client = Arc::new(client);
    let entitlements = Arc::new(entitlements);
    let sink = Arc::new(RecordingSink::default());
    let identity = match user {
        Some(user) => StaticIdentity::signed_in(user),
        None => StaticIdentity::anonymous(),
    };
    let ctx = ChatContext::new(
        Arc::new(identity),
        Arc::clone(&entitlements) as Arc<dyn Entitlements>,
        Arc::clone(&sink) as Arc<dyn UsageSink>,
    )
    .with_client(Arc::clone(&client) as Arc<dyn CompletionClient>);
    Harness {
        normalizer: ChatNormalizer::new(ctx, ChatConfig::default()),
        client,
        entitlements,
        sink,
    }
}

pub fn request(provider: Provider, model: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::user("Say hello")],
        model: model.to_string(),
        provider,
        api_key: None,
    }
}

/// Drains a normalized stream, splitting off a trailing error if any.
pub async fn collect(
    stream: kitbase_chat::NormalizedStream,
) -> (Vec<NormalizedEvent>, Option<ChatError>) {
    let mut events = Vec::new();
    let mut stream = stream;
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => events.push(event),
            Err(e) => {
                assert!(stream.next().await.is_none(), "stream continued after error");
                return (events, Some(e));
            }
        }
    }
    (events, None)
}

pub fn contents(events: &[NormalizedEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            NormalizedEvent::Content { content } => Some(content.clone()),
            _ => None,
        })
        .collect()
}

// ── Wire fixtures ───────────────────────────────────────────────

pub fn openai_chunk(text: &str) -> String {
    let chunk = json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [{ "index": 0, "delta": { "content": text }, "finish_reason": null }]
    });
    format!("data: {chunk}\n\n")
}

pub fn openai_finish(reason: &str, prompt: u64, completion: u64) -> String {
    let stop = json!({
        "choices": [{ "index": 0, "delta": {}, "finish_reason": reason }]
    });
    let usage = json!({
        "choices": [],
        "usage": {
            "prompt_tokens": prompt,
            "completion_tokens": completion,
            "total_tokens": prompt + completion
        }
    });
    format!("data: {stop}\n\ndata: {usage}\n\n")
}

pub const OPENAI_DONE: &str = "data: [DONE]\n\n";

pub fn openai_script(texts: &[&str]) -> Vec<Step> {
    let mut steps: Vec<Step> = texts.iter().map(|t| Step::Data(openai_chunk(t))).collect();
    steps.push(Step::Data(openai_finish("stop", 12, texts.len() as u64)));
    steps.push(Step::Data(OPENAI_DONE.to_string()));
    steps
}

pub fn anthropic_frame(event: &str, data: serde_json::Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

pub fn anthropic_delta(text: &str) -> String {
    anthropic_frame(
        "content_block_delta",
        json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": text }
        }),
    )
}

pub fn anthropic_script(texts: &[&str]) -> Vec<Step> {
    let mut steps = vec![
        Step::Data(anthropic_frame(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": "msg_1",
                    "role": "assistant",
                    "content": [],
                    "usage": { "input_tokens": 25, "output_tokens": 1 }
                }
            }),
        )),
        Step::Data(anthropic_frame(
            "content_block_start",
            json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": { "type": "text", "text": "" }
            }),
        )),
        Step::Data(anthropic_frame("ping", json!({ "type": "ping" }))),
    ];
    steps.extend(texts.iter().map(|t| Step::Data(anthropic_delta(t))));
    steps.push(Step::Data(anthropic_frame(
        "content_block_stop",
        json!({ "type": "content_block_stop", "index": 0 }),
    )));
    steps.push(Step::Data(anthropic_frame(
        "message_delta",
        json!({
            "type": "message_delta",
            "delta": { "stop_reason": "end_turn", "stop_sequence": null },
            "usage": { "output_tokens": 15 }
        }),
    )));
    steps.push(Step::Data(anthropic_frame(
        "message_stop",
        json!({ "type": "message_stop" }),
    )));
    steps
}
