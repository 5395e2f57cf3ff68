//! Speech-to-text as an external collaborator.
//!
//! No production STT backend is bundled; an agent is wired up with any
//! implementation of [`SttSource`].

use crate::frame::Word;
use crate::stage::Queued;

/// Streams transcribed words from a live microphone feed.
///
/// Implementations are expected to emit a terminal frame (`terminal:
/// true` on the final [`Queued`] item of an utterance) to mark the
/// speech-end boundary the chatbot stage and sentence segmenter key off
/// of; empty or whitespace-only transcriptions should still be emitted so
/// the terminal boundary isn't lost, and the chatbot stage is responsible
/// for dropping them.
#[async_trait::async_trait]
pub trait SttSource: Send + Sync {
    /// Pull the next transcribed word, or `None` once the session ends.
    async fn next_word(&self) -> Option<Queued<Word>>;
}
