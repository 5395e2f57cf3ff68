//! Streaming concurrency core for a real-time voice agent.
//!
//! This crate owns the concurrency substrate of a speech-to-speech
//! pipeline — the stage/queue abstraction, the interrupt cascade, the LLM
//! generation controller, the global transcript, and the sentence
//! segmenter — wired together in [`agent::VoiceAgent`]:
//!
//! Microphone/STT → ChatBot → Segmenter → TTS → Speaker
//!
//! External collaborators (the STT/TTS/LLM-weight providers themselves,
//! the audio devices, the sentence-boundary algorithm) are modeled as
//! traits with no bundled production adapter; this crate is the plumbing
//! that holds them together, not the models or devices.

pub mod agent;
pub mod cascade;
pub mod chatbot;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod frame;
pub mod llm;
pub mod segmenter;
pub mod stage;
pub mod stt;
pub mod transcript;
pub mod tts;
pub mod worker_pool;

pub use agent::VoiceAgent;
pub use config::{ChatBotConfig, Credentials, CoreConfig};
pub use error::{CoreError, Result};
