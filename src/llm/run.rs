//! The two concrete inference run variants: an in-process local model and
//! a remote OpenAI-compatible streaming HTTP chat completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt as _;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::llm::sse::SseLineParser;
use crate::llm::{next_run_id, ChatMessage, OnEnd, OnWord, PromptFetcher};
use crate::worker_pool::WorkerPool;

/// A single in-flight (or completed) generation: local or remote, started
/// by the [`crate::llm::GenerationController`].
///
/// `flush` may be called at most once; a second call is a no-op, matching
/// the teacher's "attach flush if not already flushed, else start a brand
/// new run" composition at the chatbot layer, which relies on `flush`
/// itself being safe to no-op on a previously-flushed run.
pub trait InferenceRun: Send + Sync {
    /// This run's globally unique id.
    fn run_id(&self) -> u64;

    /// Attach consumer callbacks and start delivering words. `on_end` fires
    /// exactly once, after the last `on_word` (or immediately if the run
    /// was already cancelled).
    fn flush(self: Arc<Self>, on_word: OnWord, on_end: OnEnd);

    /// Request cancellation. Idempotent.
    fn cancel(&self);

    /// Whether this run has been cancelled.
    fn is_cancelled(&self) -> bool;
}

/// The external in-process model collaborator a [`LocalInferenceRun`]
/// drives. No concrete model backend is bundled with this crate.
#[async_trait::async_trait]
pub trait LocalModel: Send + Sync {
    /// Generate at most `max_tokens` tokens for `messages`, pushing each
    /// decoded fragment onto `tokens_out` as it's produced. Must stop
    /// promptly once `stop` is cancelled.
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: usize,
        tokens_out: mpsc::UnboundedSender<String>,
        stop: CancellationToken,
    ) -> Result<()>;
}

struct SharedRunState {
    cancelled: Arc<AtomicBool>,
    stop: CancellationToken,
    flushed: AtomicBool,
    producer_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    consumer_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SharedRunState {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            stop: CancellationToken::new(),
            flushed: AtomicBool::new(false),
            producer_handle: Mutex::new(None),
            consumer_handle: Mutex::new(None),
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return; // already cancelled
        }
        self.stop.cancel();
        let producer = self.producer_handle.lock().expect("run mutex poisoned").take();
        let consumer = self.consumer_handle.lock().expect("run mutex poisoned").take();
        tokio::task::spawn(async move {
            if let Some(handle) = producer {
                let _ = handle.await;
            }
            if let Some(handle) = consumer {
                let _ = handle.await;
            }
        });
    }
}

/// An inference run backed by an in-process model.
pub struct LocalInferenceRun {
    id: u64,
    state: SharedRunState,
    token_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    pool: WorkerPool,
}

impl LocalInferenceRun {
    /// Start a new local generation: fetch the prompt, check for
    /// cancellation, then drive `model.generate` on the shared worker
    /// pool. Construction returns once the generate task has been
    /// scheduled, not once it has produced output.
    pub fn start(
        model: Arc<dyn LocalModel>,
        prompt_fetcher: Arc<dyn PromptFetcher>,
        max_tokens: usize,
        pool: WorkerPool,
    ) -> Arc<Self> {
        let id = next_run_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let run = Arc::new(Self {
            id,
            state: SharedRunState::new(),
            token_rx: Mutex::new(Some(rx)),
            pool,
        });

        let cancelled = run.state.cancelled.clone();
        let stop = run.state.stop.clone();
        let handle = run.pool.spawn(async move {
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            let messages = prompt_fetcher.fetch().await;
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            if let Err(err) = model.generate(messages, max_tokens, tx, stop).await {
                warn!("local inference run {id} failed: {err}");
            }
        });
        *run.state.producer_handle.lock().expect("run mutex poisoned") = Some(handle);

        info!("started local inference run {id}");
        run
    }
}

impl InferenceRun for LocalInferenceRun {
    fn run_id(&self) -> u64 {
        self.id
    }

    fn flush(self: Arc<Self>, on_word: OnWord, on_end: OnEnd) {
        if self.state.flushed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(mut rx) = self.token_rx.lock().expect("run mutex poisoned").take() else {
            return;
        };
        let id = self.id;
        let run = self.clone();
        let handle = self.pool.spawn(async move {
            while let Some(token) = rx.recv().await {
                if run.is_cancelled() {
                    break;
                }
                on_word(&token);
            }
            on_end();
            info!("flushed local inference run {id}");
        });
        *self.state.consumer_handle.lock().expect("run mutex poisoned") = Some(handle);
    }

    fn cancel(&self) {
        self.state.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

/// Transport configuration for a remote OpenAI-compatible chat completion
/// endpoint.
#[derive(Debug, Clone)]
pub struct RemoteLlmConfig {
    /// Full chat-completions URL.
    pub url: String,
    /// Bearer token. Empty for unauthenticated endpoints.
    pub api_key: String,
    /// Model identifier sent in the request body.
    pub model: String,
}

impl RemoteLlmConfig {
    /// Resolve transport config for a string model id per the selection
    /// rule in [`crate::llm::classify_model_id`]: a recognized vendor
    /// prefix talks to `vendor_url` with `vendor_api_key`; any other id is
    /// assumed to be served by a local OpenAI-compatible endpoint at
    /// `local_url`, unauthenticated.
    pub fn for_model_id(
        model_id: &str,
        vendor_url: &str,
        vendor_api_key: &str,
        local_url: &str,
    ) -> Self {
        match crate::llm::classify_model_id(model_id) {
            crate::llm::ModelBackend::VendorRemote => Self {
                url: vendor_url.to_owned(),
                api_key: vendor_api_key.to_owned(),
                model: model_id.to_owned(),
            },
            crate::llm::ModelBackend::LocalOpenAiCompatible => Self {
                url: local_url.to_owned(),
                api_key: String::new(),
                model: model_id.to_owned(),
            },
        }
    }
}

/// An inference run backed by a streaming remote chat completion.
pub struct RemoteInferenceRun {
    id: u64,
    state: SharedRunState,
    delta_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    flush_rate: usize,
    pool: WorkerPool,
}

impl RemoteInferenceRun {
    /// Start a new remote generation: opens the streaming HTTP request on
    /// the shared worker pool.
    pub fn start(
        client: reqwest::Client,
        config: RemoteLlmConfig,
        prompt_fetcher: Arc<dyn PromptFetcher>,
        max_tokens: usize,
        flush_rate: usize,
        pool: WorkerPool,
    ) -> Arc<Self> {
        let id = next_run_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let run = Arc::new(Self {
            id,
            state: SharedRunState::new(),
            delta_rx: Mutex::new(Some(rx)),
            flush_rate: flush_rate.max(1),
            pool,
        });

        let cancelled = run.state.cancelled.clone();
        let stop = run.state.stop.clone();
        let handle = run.pool.spawn(async move {
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            let messages = prompt_fetcher.fetch().await;
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            if let Err(err) =
                stream_remote_chat(client, config, messages, max_tokens, tx, stop).await
            {
                warn!("remote inference run {id} failed: {err}");
            }
        });
        *run.state.producer_handle.lock().expect("run mutex poisoned") = Some(handle);

        info!("started remote inference run {id}");
        run
    }
}

async fn stream_remote_chat(
    client: reqwest::Client,
    config: RemoteLlmConfig,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    tx: mpsc::UnboundedSender<String>,
    stop: CancellationToken,
) -> Result<()> {
    let body = serde_json::json!({
        "model": config.model,
        "messages": messages.iter().map(|m| serde_json::json!({
            "role": m.role,
            "content": m.content,
        })).collect::<Vec<_>>(),
        "max_tokens": max_tokens,
        "stream": true,
    });

    let mut request = client.post(&config.url).json(&body);
    if !config.api_key.is_empty() {
        request = request.bearer_auth(&config.api_key);
    }

    let response = request
        .send()
        .await
        .map_err(|e| CoreError::Provider(format!("remote chat request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(CoreError::Provider(format!(
            "remote chat request returned {}",
            response.status()
        )));
    }

    let mut parser = SseLineParser::new();
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| CoreError::Provider(format!("stream read failed: {e}")))?;
        let text = String::from_utf8_lossy(&chunk);
        for event in parser.push(&text) {
            if event.is_done() {
                return Ok(());
            }
            if let Some(delta) = extract_delta(&event.data) {
                let _ = tx.send(delta);
            }
        }
    }
    for event in parser.flush() {
        if let Some(delta) = extract_delta(&event.data) {
            let _ = tx.send(delta);
        }
    }
    Ok(())
}

fn extract_delta(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(str::to_owned)
}

impl InferenceRun for RemoteInferenceRun {
    fn run_id(&self) -> u64 {
        self.id
    }

    fn flush(self: Arc<Self>, on_word: OnWord, on_end: OnEnd) {
        if self.state.flushed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(mut rx) = self.delta_rx.lock().expect("run mutex poisoned").take() else {
            return;
        };
        let flush_rate = self.flush_rate;
        let id = self.id;
        let run = self.clone();
        let handle = self.pool.spawn(async move {
            let mut buffer = String::new();
            let mut word_count = 0usize;
            while let Some(delta) = rx.recv().await {
                if run.is_cancelled() {
                    break;
                }
                word_count += delta.split_whitespace().count();
                buffer.push_str(&delta);
                if word_count >= flush_rate {
                    on_word(&buffer);
                    buffer.clear();
                    word_count = 0;
                }
            }
            if !buffer.is_empty() && !run.is_cancelled() {
                on_word(&buffer);
            }
            on_end();
            info!("flushed remote inference run {id}");
        });
        *self.state.consumer_handle.lock().expect("run mutex poisoned") = Some(handle);
    }

    fn cancel(&self) {
        self.state.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}
