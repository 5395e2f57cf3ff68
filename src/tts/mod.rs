//! Text-to-speech as an external collaborator.
//!
//! No production TTS backend is bundled; an agent is wired up with any
//! implementation of [`TtsSink`].

use crate::error::Result;
use crate::frame::SynthesizedAudio;

/// Voice selection and delivery rate for a synthesis request.
#[derive(Debug, Clone)]
pub struct VoiceParams {
    /// Provider-specific voice identifier, typically loaded from the
    /// environment alongside the TTS API key.
    pub voice_id: String,
    /// Playback speed multiplier; `1.0` is the provider's default pace.
    pub speed: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice_id: String::new(),
            speed: 1.0,
        }
    }
}

/// Synthesizes sentences into playable audio.
#[async_trait::async_trait]
pub trait TtsSink: Send + Sync {
    /// Synthesize `text` to audio using `voice`.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails.
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<SynthesizedAudio>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentTts;

    #[async_trait::async_trait]
    impl TtsSink for SilentTts {
        async fn synthesize(&self, _text: &str, _voice: &VoiceParams) -> Result<SynthesizedAudio> {
            Ok(SynthesizedAudio {
                samples: Vec::new(),
                sample_rate: 24_000,
            })
        }
    }

    #[tokio::test]
    async fn synthesize_returns_audio_frame() {
        let tts = SilentTts;
        let audio = tts.synthesize("hello", &VoiceParams::default()).await.unwrap();
        assert_eq!(audio.sample_rate, 24_000);
    }

    #[test]
    fn default_voice_params_has_unit_speed() {
        let params = VoiceParams::default();
        assert_eq!(params.speed, 1.0);
        assert!(params.voice_id.is_empty());
    }
}
