//! S5 — the remote stream ends after a couple of partial deltas with no
//! `[DONE]` sentinel. The residual buffer must still flush, `on_end` must
//! fire exactly once, and the controller must remain usable afterward.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use synapse_core::llm::run::{RemoteInferenceRun, RemoteLlmConfig};
use synapse_core::llm::{ChatMessage, GenerationController, InferenceRun, OnEnd, OnWord, PromptFetcher};
use synapse_core::worker_pool::WorkerPool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedPrompt;

#[async_trait::async_trait]
impl PromptFetcher for FixedPrompt {
    async fn fetch(&self) -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: "user".into(),
            content: "hi".into(),
        }]
    }
}

#[tokio::test]
async fn partial_stream_end_flushes_residual_and_ends_once() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello \"}}]}\n\n\
                data: {\"choices\":[{\"delta\":{\"content\":\"there \"}}]}\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let config = RemoteLlmConfig {
        url: format!("{}/v1/chat/completions", server.uri()),
        api_key: String::new(),
        model: "local-model".to_owned(),
    };
    let pool = WorkerPool::new(4);
    let client = reqwest::Client::new();
    let run = RemoteInferenceRun::start(client, config, Arc::new(FixedPrompt), 100, 3, pool);

    let words = Arc::new(Mutex::new(Vec::new()));
    let end_count = Arc::new(AtomicUsize::new(0));
    let w = words.clone();
    let e = end_count.clone();
    let on_word: OnWord = Arc::new(move |text| w.lock().unwrap().push(text.to_owned()));
    let on_end: OnEnd = Arc::new(move || {
        e.fetch_add(1, Ordering::SeqCst);
    });

    run.clone().flush(on_word, on_end);
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while end_count.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run did not end in time");

    assert_eq!(end_count.load(Ordering::SeqCst), 1);
    let collected = words.lock().unwrap();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0], "Hello there ");

    // The controller is still usable for the next generate() after a
    // run ends on its own — no poisoned state left behind.
    let controller = GenerationController::new();
    controller.start(run);
    assert!(controller.current().is_some());
}
