//! End-to-end wiring: Microphone → STT → ChatBot → Segmenter → TTS → Speaker.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cascade::InterruptCascade;
use crate::chatbot::{ChatBot, RunFactory};
use crate::config::{ChatBotConfig, StageConfig};
use crate::event_bus::EventBus;
use crate::frame::{SentenceChunk, SynthesizedAudio, Word};
use crate::segmenter::{SentenceBoundaryDetector, SentenceSegmenter};
use crate::stage::FrameQueue;
use crate::stt::SttSource;
use crate::transcript::GlobalTranscript;
use crate::tts::{TtsSink, VoiceParams};

/// Raw PCM playback device the synthesized audio is ultimately written to.
///
/// Microphone capture is not modeled here: an [`SttSource`] implementation
/// is expected to own its own capture device internally, the way the
/// upstream transcription provider always does.
#[async_trait::async_trait]
pub trait Speaker: Send + Sync {
    /// Play one chunk of synthesized audio.
    async fn play(&self, audio: SynthesizedAudio);
}

/// A fully wired voice agent: capture is handled by the `stt` source; the
/// agent owns the chatbot, segmenter, and synthesis/playback legs, and the
/// queues that connect them.
pub struct VoiceAgent {
    bus: Arc<EventBus>,
    chatbot_input: Arc<FrameQueue<Word>>,
    chatbot_output: Arc<FrameQueue<Word>>,
    sentences: Arc<FrameQueue<SentenceChunk>>,
    workers: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    close_timeout: Duration,
}

impl VoiceAgent {
    /// Wire a complete agent and spawn its worker tasks. Returns once
    /// every stage is running; callers drive the agent's lifetime by
    /// holding the returned handle and calling [`VoiceAgent::shutdown`].
    pub fn wire(
        stages: StageConfig,
        chatbot_config: ChatBotConfig,
        stt: Arc<dyn SttSource>,
        run_factory: Arc<dyn RunFactory>,
        detector: impl SentenceBoundaryDetector + 'static,
        tts: Arc<dyn TtsSink>,
        voice: VoiceParams,
        speaker: Arc<dyn Speaker>,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let transcript = Arc::new(GlobalTranscript::new(bus.clone()));
        let cascade = Arc::new(InterruptCascade::new(bus.clone()));

        let chatbot_input = Arc::new(FrameQueue::new(stages.queue_capacity));
        let chatbot_output = Arc::new(FrameQueue::new(stages.queue_capacity));
        let sentences = Arc::new(FrameQueue::new(stages.queue_capacity));

        let chatbot = ChatBot::new(
            bus.clone(),
            cascade.clone(),
            chatbot_input.clone(),
            chatbot_output.clone(),
            transcript,
            run_factory,
            chatbot_config,
        );

        let segmenter = Arc::new(SentenceSegmenter::new(sentences.clone(), cascade.clone()));

        let mut workers = Vec::new();

        // Microphone/STT ingest: bridge the external transcription source
        // into the chatbot's input queue.
        let ingest_queue = chatbot_input.clone();
        let ingest_source = stt.clone();
        workers.push(tokio::task::spawn(async move {
            while let Some(item) = ingest_source.next_word().await {
                if ingest_queue.commit(item.frame, item.terminal).is_err() {
                    break;
                }
            }
            ingest_queue.close();
        }));

        // ChatBot processing loop.
        workers.push(tokio::task::spawn(chatbot.run()));

        // ChatBot output -> segmenter.
        let bridge_output = chatbot_output.clone();
        let bridge_segmenter = segmenter.clone();
        workers.push(tokio::task::spawn(async move {
            while let Some(item) = bridge_output.iterate().await {
                bridge_segmenter.push_word(&item.frame.text);
                if item.terminal {
                    bridge_segmenter.signal_speech_end();
                }
            }
            bridge_segmenter.close();
        }));

        // Segmenter worker loop.
        let segmenter_loop = segmenter.clone();
        workers.push(tokio::task::spawn(async move {
            segmenter_loop.run(detector).await;
        }));

        // Sentences -> TTS -> Speaker.
        let synth_sentences = sentences.clone();
        let synth_tts = tts;
        let synth_speaker = speaker;
        let synth_voice = voice;
        workers.push(tokio::task::spawn(async move {
            while let Some(item) = synth_sentences.iterate().await {
                match synth_tts.synthesize(&item.frame.text, &synth_voice).await {
                    Ok(audio) => synth_speaker.play(audio).await,
                    Err(err) => {
                        tracing::error!("synthesis failed: {err}");
                    }
                }
            }
        }));

        info!("voice agent wired and running");

        Arc::new(Self {
            bus,
            chatbot_input,
            chatbot_output,
            sentences,
            workers: tokio::sync::Mutex::new(workers),
            close_timeout: Duration::from_secs(stages.close_join_timeout_secs),
        })
    }

    /// The shared event bus, for attaching diagnostics or additional
    /// cross-stage handlers.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Close every stage source-to-sink and wait (bounded by the
    /// configured join timeout) for their workers to drain and exit.
    pub async fn shutdown(&self) {
        self.chatbot_input.close();
        self.chatbot_output.close();
        self.sentences.close();

        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            if tokio::time::timeout(self.close_timeout, worker).await.is_err() {
                tracing::warn!("voice agent worker did not join within {:?}", self.close_timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::run::LocalModel;
    use crate::llm::{ChatMessage, InferenceRun, PromptFetcher};
    use crate::segmenter::CharPull;
    use crate::stage::Queued;
    use std::sync::Mutex;
    use std::time::Instant;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct ScriptedStt {
        words: Mutex<Vec<Queued<Word>>>,
    }

    #[async_trait::async_trait]
    impl SttSource for ScriptedStt {
        async fn next_word(&self) -> Option<Queued<Word>> {
            self.words.lock().unwrap().pop()
        }
    }

    struct EchoModel;

    #[async_trait::async_trait]
    impl LocalModel for EchoModel {
        async fn generate(
            &self,
            messages: Vec<ChatMessage>,
            _max_tokens: usize,
            tokens_out: mpsc::UnboundedSender<String>,
            stop: CancellationToken,
        ) -> crate::error::Result<()> {
            let last_user = messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone())
                .unwrap_or_default();
            for word in last_user.split_whitespace() {
                if stop.is_cancelled() {
                    return Ok(());
                }
                let _ = tokens_out.send(format!("{word}."));
            }
            Ok(())
        }
    }

    struct LocalRunFactory {
        pool: crate::worker_pool::WorkerPool,
    }

    impl RunFactory for LocalRunFactory {
        fn start(&self, prompt_fetcher: Arc<dyn PromptFetcher>) -> Arc<dyn InferenceRun> {
            crate::llm::run::LocalInferenceRun::start(
                Arc::new(EchoModel),
                prompt_fetcher,
                100,
                self.pool.clone(),
            )
        }
    }

    struct WhitespaceSplitter {
        buf: String,
    }

    #[async_trait::async_trait]
    impl SentenceBoundaryDetector for WhitespaceSplitter {
        async fn next_sentence(&mut self, source: &dyn CharPull) -> Option<String> {
            loop {
                match source.pull().await {
                    Some(c) if c == '.' => {
                        return Some(std::mem::take(&mut self.buf).trim().to_owned());
                    }
                    Some(c) => self.buf.push(c),
                    None => {
                        if self.buf.trim().is_empty() {
                            return None;
                        }
                        return Some(std::mem::take(&mut self.buf).trim().to_owned());
                    }
                }
            }
        }
    }

    struct RecordingSpeaker {
        played: Arc<Mutex<Vec<SynthesizedAudio>>>,
    }

    #[async_trait::async_trait]
    impl Speaker for RecordingSpeaker {
        async fn play(&self, audio: SynthesizedAudio) {
            self.played.lock().unwrap().push(audio);
        }
    }

    struct SilentTts;

    #[async_trait::async_trait]
    impl TtsSink for SilentTts {
        async fn synthesize(&self, _text: &str, _voice: &VoiceParams) -> crate::error::Result<SynthesizedAudio> {
            Ok(SynthesizedAudio {
                samples: Vec::new(),
                sample_rate: 24_000,
            })
        }
    }

    #[tokio::test]
    async fn end_to_end_exchange_reaches_the_speaker() {
        let stt = Arc::new(ScriptedStt {
            words: Mutex::new(vec![Queued {
                frame: Word {
                    text: "hello there".to_owned(),
                    speaker: "user".to_owned(),
                    is_ai: false,
                    emitted_at: Instant::now(),
                },
                terminal: true,
            }]),
        });
        let played = Arc::new(Mutex::new(Vec::new()));
        let speaker = Arc::new(RecordingSpeaker { played: played.clone() });
        let factory = Arc::new(LocalRunFactory {
            pool: crate::worker_pool::WorkerPool::new(4),
        });

        let agent = VoiceAgent::wire(
            StageConfig::default(),
            ChatBotConfig::default(),
            stt,
            factory,
            WhitespaceSplitter { buf: String::new() },
            Arc::new(SilentTts),
            VoiceParams::default(),
            speaker,
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!played.lock().unwrap().is_empty());
        agent.shutdown().await;
    }
}
