//! S3 — STT emits a word, then a mis-prediction correction marker for it,
//! then the words that follow. The marker must survive verbatim into the
//! transcript and therefore into the prompt handed to the next generation,
//! so a downstream model can compensate for the earlier mis-transcription.

use std::sync::Arc;

use synapse_core::cascade::InterruptCascade;
use synapse_core::chatbot::{ChatBot, RunFactory};
use synapse_core::config::ChatBotConfig;
use synapse_core::event_bus::EventBus;
use synapse_core::frame::Word;
use synapse_core::llm::run::LocalModel;
use synapse_core::llm::{ChatMessage, InferenceRun, PromptFetcher};
use synapse_core::stage::FrameQueue;
use synapse_core::transcript::GlobalTranscript;
use synapse_core::worker_pool::WorkerPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Records the full prompt it was handed on every invocation so the test
/// can assert on what the bot actually sent upstream.
struct RecordingModel {
    prompts: Arc<std::sync::Mutex<Vec<Vec<ChatMessage>>>>,
}

#[async_trait::async_trait]
impl LocalModel for RecordingModel {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        _max_tokens: usize,
        _tokens_out: mpsc::UnboundedSender<String>,
        _stop: CancellationToken,
    ) -> synapse_core::error::Result<()> {
        self.prompts.lock().unwrap().push(messages);
        Ok(())
    }
}

struct RecordingRunFactory {
    pool: WorkerPool,
    prompts: Arc<std::sync::Mutex<Vec<Vec<ChatMessage>>>>,
}

impl RunFactory for RecordingRunFactory {
    fn start(&self, prompt_fetcher: Arc<dyn PromptFetcher>) -> Arc<dyn InferenceRun> {
        synapse_core::llm::run::LocalInferenceRun::start(
            Arc::new(RecordingModel { prompts: self.prompts.clone() }),
            prompt_fetcher,
            100,
            self.pool.clone(),
        )
    }
}

fn word(text: &str) -> Word {
    Word::new(text, "user", false)
}

#[tokio::test]
async fn correction_marker_survives_into_the_prompt() {
    let bus = Arc::new(EventBus::new());
    let input = Arc::new(FrameQueue::new(16));
    let output = Arc::new(FrameQueue::new(16));
    let transcript = Arc::new(GlobalTranscript::new(bus.clone()));
    let cascade = Arc::new(InterruptCascade::new(bus.clone()));
    let prompts = Arc::new(std::sync::Mutex::new(Vec::new()));
    let factory = Arc::new(RecordingRunFactory {
        pool: WorkerPool::new(4),
        prompts: prompts.clone(),
    });
    let config = ChatBotConfig {
        bot_name: "assistant".to_owned(),
        human_names: vec!["user".to_owned()],
        infer_on_new_words: false,
    };

    let bot = ChatBot::new(bus.clone(), cascade, input.clone(), output.clone(), transcript.clone(), factory, config);
    let handle = tokio::spawn(bot.run());

    input.commit(word("The"), false).unwrap();
    input.commit(word("<!The, iter=0>"), false).unwrap();
    input.commit(word("Please"), false).unwrap();
    input.commit(word("stop."), true).unwrap();

    // Give the speech-end generation a moment to fire and record a prompt.
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(500);
    while prompts.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let entry = transcript.get_transcript();
    let current_text: String = entry
        .iter()
        .map(|t| t.content.clone())
        .collect::<Vec<_>>()
        .join(" ");
    assert!(
        current_text.contains("<!The, iter=0>"),
        "correction marker missing from transcript: {current_text:?}"
    );

    let recorded = prompts.lock().unwrap();
    assert!(
        recorded
            .iter()
            .any(|msgs| msgs.iter().any(|m| m.content.contains("<!The, iter=0>"))),
        "correction marker never reached the model prompt: {recorded:?}"
    );

    input.close();
    handle.await.unwrap();
}
