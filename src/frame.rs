//! Frame types exchanged between stages.

use std::time::Instant;

/// A word (or word fragment) emitted by a speaker, with provenance.
#[derive(Debug, Clone)]
pub struct Word {
    /// The text fragment.
    pub text: String,
    /// Name of the speaker who produced this word (e.g. `"user"`, a bot name).
    pub speaker: String,
    /// Whether this frame's speaker is the conversational AI rather than a
    /// human participant. Classification is sticky per speaker name — see
    /// [`crate::transcript::GlobalTranscript`].
    pub is_ai: bool,
    /// When this word was produced.
    pub emitted_at: Instant,
}

impl Word {
    /// Build a new word frame stamped with the current time.
    pub fn new(text: impl Into<String>, speaker: impl Into<String>, is_ai: bool) -> Self {
        Self {
            text: text.into(),
            speaker: speaker.into(),
            is_ai,
            emitted_at: Instant::now(),
        }
    }
}

/// A complete sentence accumulated from words, ready for downstream synthesis.
#[derive(Debug, Clone)]
pub struct SentenceChunk {
    /// Complete sentence text.
    pub text: String,
}

/// Synthesized audio ready for playback.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// f32 audio samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    /// Convert to 16-bit little-endian PCM bytes: each sample is clipped
    /// to `[-1.0, 1.0]`, scaled by `i16::MAX`, and written little-endian —
    /// the wire format speaker devices and recorded transcripts expect.
    pub fn to_pcm16_le(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for &sample in &self.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let value = (clamped * i16::MAX as f32).round() as i16;
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}
