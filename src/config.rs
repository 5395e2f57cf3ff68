//! Configuration and credential loading for the streaming concurrency core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level configuration for the streaming core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Per-stage queue and shutdown behavior.
    pub stages: StageConfig,
    /// Remote LLM provider streaming behavior.
    pub llm: LlmConfig,
    /// Conversational identity used by the chatbot stage.
    pub chatbot: ChatBotConfig,
    /// Default voice selection for synthesis requests.
    pub tts: TtsConfig,
}

/// Default voice selection for the TTS stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Provider voice identifier, typically overridden from the
    /// `SYNAPSE_TTS_VOICE_ID` environment variable at startup.
    pub voice_id: String,
    /// Playback speed multiplier; `1.0` is the provider's default pace.
    pub speed: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice_id: String::new(),
            speed: 1.0,
        }
    }
}

/// Stage queue capacities and shutdown timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Bounded capacity of each stage's input queue.
    pub queue_capacity: usize,
    /// Target capacity of the shared worker pool used for generation,
    /// flush, and cancel tasks.
    pub worker_pool_capacity: usize,
    /// How long `close()` waits for a stage's workers to join before giving up.
    pub close_join_timeout_secs: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            worker_pool_capacity: 32,
            close_join_timeout_secs: 2,
        }
    }
}

/// Language model generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Maximum tokens to generate per run.
    pub max_tokens: usize,
    /// Number of whitespace-delimited words to buffer before the remote
    /// provider emits a word frame downstream.
    pub flush_rate: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            flush_rate: 3,
        }
    }
}

/// ChatBot stage identity and generation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatBotConfig {
    /// Display name the bot attributes its own transcript turns to.
    pub bot_name: String,
    /// Speaker names recognized as human participants.
    pub human_names: Vec<String>,
    /// Whether to start a speculative generation on every new word instead
    /// of waiting for the speech-end sentinel.
    pub infer_on_new_words: bool,
}

impl Default for ChatBotConfig {
    fn default() -> Self {
        Self {
            bot_name: "assistant".to_owned(),
            human_names: vec!["user".to_owned()],
            infer_on_new_words: true,
        }
    }
}

/// Resolved credentials for external providers, loaded from the environment.
///
/// All secret fields are resolved to plaintext `String` values. This struct
/// intentionally implements a custom [`Debug`] that redacts every value to
/// prevent accidental secret leakage in logs.
#[derive(Clone, Default)]
pub struct Credentials {
    /// API key for the remote LLM provider.
    pub llm_api_key: String,
    /// API key for the STT provider, if the configured provider requires one.
    pub stt_api_key: String,
    /// API key for the TTS provider, if the configured provider requires one.
    pub tts_api_key: String,
    /// Default TTS voice id. Not a secret, but loaded alongside the TTS key
    /// since providers typically issue both together.
    pub tts_voice_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &redact(&self.llm_api_key))
            .field("stt_api_key", &redact(&self.stt_api_key))
            .field("tts_api_key", &redact(&self.tts_api_key))
            .field("tts_voice_id", &self.tts_voice_id)
            .finish()
    }
}

fn redact(s: &str) -> &str {
    if s.is_empty() { "" } else { "[REDACTED]" }
}

impl Credentials {
    /// Load credentials from `SYNAPSE_LLM_API_KEY`, `SYNAPSE_STT_API_KEY`,
    /// `SYNAPSE_TTS_API_KEY`, and `SYNAPSE_TTS_VOICE_ID`. Missing variables
    /// resolve to an empty string rather than an error — an empty key is a
    /// provider-level concern, not a config-loading failure.
    pub fn from_env() -> Self {
        Self {
            llm_api_key: std::env::var("SYNAPSE_LLM_API_KEY").unwrap_or_default(),
            stt_api_key: std::env::var("SYNAPSE_STT_API_KEY").unwrap_or_default(),
            tts_api_key: std::env::var("SYNAPSE_TTS_API_KEY").unwrap_or_default(),
            tts_voice_id: std::env::var("SYNAPSE_TTS_VOICE_ID").unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.stages.queue_capacity, 256);
        assert_eq!(config.stages.worker_pool_capacity, 32);
        assert_eq!(config.stages.close_join_timeout_secs, 2);
        assert_eq!(config.llm.max_tokens, 1000);
        assert_eq!(config.llm.flush_rate, 3);
        assert_eq!(config.chatbot.bot_name, "assistant");
        assert!(!config.chatbot.infer_on_new_words);
        assert_eq!(config.tts.speed, 1.0);
        assert!(config.tts.voice_id.is_empty());
    }

    #[test]
    fn debug_redacts_values() {
        let creds = Credentials {
            llm_api_key: "sk-secret".to_owned(),
            stt_api_key: String::new(),
            tts_api_key: "tts-secret".to_owned(),
            tts_voice_id: "voice-1".to_owned(),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("tts-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("stt_api_key: \"\""));
    }
}
