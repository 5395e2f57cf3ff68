//! The chatbot stage: turns transcribed words into a generated response,
//! cancelling and restarting generation as the user keeps talking.

use std::sync::Arc;

use crate::cascade::InterruptCascade;
use crate::config::ChatBotConfig;
use crate::event_bus::EventBus;
use crate::frame::Word;
use crate::llm::{ChatMessage, GenerationController, InferenceRun, OnEnd, OnWord, PromptFetcher};
use crate::stage::FrameQueue;
use crate::transcript::{GlobalTranscript, Role, EVENT_SPEAKER_CHANGE};

/// Default instructions given to the model describing the mid-generation
/// correction marker the chatbot inserts when the user's speech turns out
/// to have been transcribed differently than first predicted. A
/// correction looks like `<!original text, iter=2>`, where `iter` counts
/// how many times this particular utterance has been revised.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant. The user's speech \
is transcribed in real time, so earlier words you were shown may be corrected as more audio \
arrives. A correction appears inline as `<!text, iter=N>`, meaning the preceding text should be \
replaced with `text`; treat it as the user's actual words, not something to read aloud. Keep \
responses conversational and brief, since they will be spoken aloud.";

/// Builds an [`InferenceRun`] for a new generation. Implemented once per
/// configured LLM provider (local in-process model, or remote HTTP) by
/// the code that wires an agent together.
pub trait RunFactory: Send + Sync {
    /// Start a new run whose prompt is supplied lazily by `prompt_fetcher`.
    fn start(&self, prompt_fetcher: Arc<dyn PromptFetcher>) -> Arc<dyn InferenceRun>;
}

struct TranscriptPromptFetcher {
    transcript: Arc<GlobalTranscript>,
    system_prompt: Arc<str>,
}

#[async_trait::async_trait]
impl PromptFetcher for TranscriptPromptFetcher {
    async fn fetch(&self) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage {
            role: "system".to_owned(),
            content: self.system_prompt.to_string(),
        }];
        for turn in self.transcript.get_transcript() {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(ChatMessage {
                role: role.to_owned(),
                content: turn.content,
            });
        }
        messages
    }
}

/// Generates and speaks responses, cancelling stale speculative generations
/// as the live transcript changes and interrupting itself the moment a
/// human starts talking over it.
pub struct ChatBot {
    input: Arc<FrameQueue<Word>>,
    output: Arc<FrameQueue<Word>>,
    transcript: Arc<GlobalTranscript>,
    controller: Arc<GenerationController>,
    cascade: Arc<InterruptCascade>,
    run_factory: Arc<dyn RunFactory>,
    config: ChatBotConfig,
    system_prompt: Arc<str>,
}

impl ChatBot {
    /// Build a chatbot stage reading words from `input` and writing its
    /// own words to `output`, sharing `bus` with the rest of the agent so
    /// `speaker_change` events reach it and its own `start`/`interrupt`/
    /// `end` events reach everyone else.
    pub fn new(
        bus: Arc<EventBus>,
        cascade: Arc<InterruptCascade>,
        input: Arc<FrameQueue<Word>>,
        output: Arc<FrameQueue<Word>>,
        transcript: Arc<GlobalTranscript>,
        run_factory: Arc<dyn RunFactory>,
        config: ChatBotConfig,
    ) -> Arc<Self> {
        let system_prompt: Arc<str> = Arc::from(DEFAULT_SYSTEM_PROMPT);

        let bot = Arc::new(Self {
            input,
            output,
            transcript,
            controller: Arc::new(GenerationController::new()),
            cascade,
            run_factory,
            config,
            system_prompt,
        });

        bot.wire_self_interrupt(&bus);
        bot
    }

    /// Prevents the chatbot from interrupting itself: only a speaker
    /// change whose *old* speaker was this bot triggers a self-interrupt.
    /// A speaker change whose *new* speaker is this bot (the common case,
    /// every time it starts talking) must never trigger one.
    fn wire_self_interrupt(self: &Arc<Self>, bus: &Arc<EventBus>) {
        let bot_name = self.config.bot_name.clone();
        let controller = self.controller.clone();
        let cascade = self.cascade.clone();
        let output = self.output.clone();
        bus.on(EVENT_SPEAKER_CHANGE, move |payload| {
            if payload.string("old") == Some(bot_name.as_str()) {
                controller.cancel_current();
                let output = output.clone();
                cascade.interrupt(move || output.clear());
            }
        });
    }

    /// Drive the stage: consume words from `input` until it closes.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.input.iterate().await {
                Some(item) => {
                    if !item.frame.text.trim().is_empty() {
                        self.on_word_frame(item.frame);
                    }
                    if item.terminal {
                        self.on_speech_end();
                    }
                }
                None => {
                    self.output.close();
                    return;
                }
            }
        }
    }

    fn on_word_frame(&self, word: Word) {
        self.transcript.commit_word(&word.speaker, &word.text, word.is_ai);
        // A new word makes any in-flight speculative generation stale: it
        // was built from a transcript that's now out of date.
        self.controller.cancel_current();
        if self.config.infer_on_new_words {
            self.start_generation();
        }
    }

    fn on_speech_end(&self) {
        if !self.config.infer_on_new_words {
            self.start_generation();
        }
        self.start_flushing();
    }

    fn start_generation(&self) -> Arc<dyn InferenceRun> {
        self.cascade.start();
        let fetcher = Arc::new(TranscriptPromptFetcher {
            transcript: self.transcript.clone(),
            system_prompt: self.system_prompt.clone(),
        });
        let run = self.run_factory.start(fetcher);
        self.controller.start(run)
    }

    /// Attach flush callbacks to the current run if one is live and hasn't
    /// been cancelled, otherwise start a fresh run first.
    fn start_flushing(&self) {
        let run = match self.controller.current() {
            Some(run) if !run.is_cancelled() => run,
            _ => self.start_generation(),
        };
        self.attach_flush(run);
    }

    fn attach_flush(&self, run: Arc<dyn InferenceRun>) {
        let transcript = self.transcript.clone();
        let bot_name = self.config.bot_name.clone();
        let output = self.output.clone();
        let on_word: OnWord = Arc::new(move |word: &str| {
            transcript.commit_word(&bot_name, word, true);
            let _ = output.commit(Word::new(word, bot_name.clone(), true), false);
        });
        let cascade = self.cascade.clone();
        let on_end: OnEnd = Arc::new(move || cascade.end());
        run.flush(on_word, on_end);
    }
}
