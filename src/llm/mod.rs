//! Language model generation: inference runs, the generation controller,
//! and the remote provider's SSE transport.

pub mod run;
pub mod sse;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub use run::{InferenceRun, LocalInferenceRun, LocalModel, RemoteInferenceRun};

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next globally-unique inference run id.
pub fn next_run_id() -> u64 {
    NEXT_RUN_ID.fetch_add(1, Ordering::SeqCst)
}

/// A chat message in the prompt sent to a model.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Which concrete backend a string model identifier resolves to. A
/// non-string model handle (an in-process [`LocalModel`]) never goes
/// through this classification — it always selects the local backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    /// A hosted vendor's remote completions API (e.g. `gpt-4o` → OpenAI).
    VendorRemote,
    /// A local server speaking the OpenAI-compatible chat-completions wire
    /// format at a configured base URL.
    LocalOpenAiCompatible,
}

/// Model id prefixes recognized as a hosted vendor's remote API rather
/// than a local OpenAI-compatible endpoint.
pub const VENDOR_MODEL_PREFIXES: &[&str] = &["gpt", "o1", "o3", "o4"];

/// Classify a string model id per the selection rule: a recognized vendor
/// prefix routes to that vendor's remote API; anything else is assumed to
/// be served by a local OpenAI-compatible endpoint.
pub fn classify_model_id(model_id: &str) -> ModelBackend {
    if VENDOR_MODEL_PREFIXES.iter().any(|prefix| model_id.starts_with(prefix)) {
        ModelBackend::VendorRemote
    } else {
        ModelBackend::LocalOpenAiCompatible
    }
}

/// Supplies the prompt for a new inference run. Implemented by the chatbot
/// stage so a run doesn't need to know how the transcript is assembled
/// into messages.
#[async_trait::async_trait]
pub trait PromptFetcher: Send + Sync {
    /// Build the chat message list for a new generation.
    async fn fetch(&self) -> Vec<ChatMessage>;
}

/// Callback invoked once per emitted word.
pub type OnWord = Arc<dyn Fn(&str) + Send + Sync>;
/// Callback invoked exactly once when a run finishes producing words.
pub type OnEnd = Arc<dyn Fn() + Send + Sync>;

/// Enforces "at most one non-cancelled run at a time": starting a new run
/// always cancels whatever run is currently live before the new one begins.
pub struct GenerationController {
    current: Mutex<Option<Arc<dyn InferenceRun>>>,
}

impl GenerationController {
    /// Build a controller with no run in flight.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Cancel whatever run is live, install `run` as the new current run,
    /// and return it.
    pub fn start(&self, run: Arc<dyn InferenceRun>) -> Arc<dyn InferenceRun> {
        let previous = {
            let mut current = self.current.lock().expect("generation controller mutex poisoned");
            current.replace(run.clone())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        run
    }

    /// The currently installed run, if any.
    pub fn current(&self) -> Option<Arc<dyn InferenceRun>> {
        self.current.lock().expect("generation controller mutex poisoned").clone()
    }

    /// Cancel the current run, if any, without starting a new one.
    pub fn cancel_current(&self) {
        if let Some(run) = self.current() {
            run.cancel();
        }
    }
}

impl Default for GenerationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct FakeRun {
        id: u64,
        cancelled: AtomicBool,
    }

    impl InferenceRun for FakeRun {
        fn run_id(&self) -> u64 {
            self.id
        }

        fn flush(self: Arc<Self>, _on_word: OnWord, _on_end: OnEnd) {}

        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn next_run_id_is_monotonic() {
        let a = next_run_id();
        let b = next_run_id();
        assert!(b > a);
    }

    #[test]
    fn vendor_prefixed_model_ids_select_remote() {
        assert_eq!(classify_model_id("gpt-4o"), ModelBackend::VendorRemote);
        assert_eq!(classify_model_id("o1-preview"), ModelBackend::VendorRemote);
    }

    #[test]
    fn other_model_ids_select_local_openai_compatible() {
        assert_eq!(classify_model_id("llama-3-8b"), ModelBackend::LocalOpenAiCompatible);
        assert_eq!(classify_model_id("qwen2.5"), ModelBackend::LocalOpenAiCompatible);
    }

    #[test]
    fn starting_a_new_run_cancels_the_prior_one() {
        let controller = GenerationController::new();
        let first = Arc::new(FakeRun {
            id: 1,
            cancelled: AtomicBool::new(false),
        });
        controller.start(first.clone());
        assert!(!first.is_cancelled());

        let second = Arc::new(FakeRun {
            id: 2,
            cancelled: AtomicBool::new(false),
        });
        controller.start(second.clone());
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(controller.current().unwrap().run_id(), 2);
    }

    #[test]
    fn at_most_one_run_is_ever_current() {
        let controller = GenerationController::new();
        let _count = AtomicUsize::new(0);
        for id in 1..=5 {
            let run = Arc::new(FakeRun {
                id,
                cancelled: AtomicBool::new(false),
            });
            controller.start(run);
        }
        assert_eq!(controller.current().unwrap().run_id(), 5);
    }

    #[test]
    fn cancel_is_idempotent() {
        let run = Arc::new(FakeRun {
            id: 1,
            cancelled: AtomicBool::new(false),
        });
        run.cancel();
        run.cancel();
        assert!(run.is_cancelled());
    }
}
