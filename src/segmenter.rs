//! Incremental sentence segmentation over a stream of characters.
//!
//! Text arrives word-by-word from upstream; this stage buffers characters
//! and feeds them to an external sentence-boundary detector, which may
//! consume them at its own pace (it's allowed to look ahead before
//! deciding a sentence is complete). The boundary algorithm itself is out
//! of scope here — this module only owns the plumbing around it: a
//! clearable char queue, the worker loop, and interrupt/close handling.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

use crate::cascade::InterruptCascade;
use crate::event_bus::{EventBus, EventPayload};
use crate::frame::SentenceChunk;
use crate::stage::FrameQueue;

/// Sentinel pushed onto the char queue to unblock the worker without
/// implying a real character was read — used both to flush a trailing
/// partial sentence at speech-end and to wake the worker on close/interrupt.
enum CharItem {
    Char(char),
    Sentinel,
}

/// A pull-based supplier of characters the boundary detector reads from.
/// Mirrors a lazy iterator: each call blocks until a character or the
/// sentinel is available.
struct CharSource {
    queue: Mutex<VecDeque<CharItem>>,
    notify: Notify,
}

impl CharSource {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    fn push_char(&self, c: char) {
        self.queue.lock().expect("char queue mutex poisoned").push_back(CharItem::Char(c));
        self.notify.notify_one();
    }

    fn push_sentinel(&self) {
        self.queue.lock().expect("char queue mutex poisoned").push_back(CharItem::Sentinel);
        self.notify.notify_one();
    }

    fn clear(&self) {
        self.queue.lock().expect("char queue mutex poisoned").clear();
    }

    /// Pull the next character. Returns `None` on the sentinel.
    async fn next_char(&self) -> Option<char> {
        loop {
            {
                let mut queue = self.queue.lock().expect("char queue mutex poisoned");
                match queue.pop_front() {
                    Some(CharItem::Char(c)) => return Some(c),
                    Some(CharItem::Sentinel) => return None,
                    None => {}
                }
            }
            self.notify.notified().await;
        }
    }
}

/// The external sentence-boundary algorithm this stage delegates to.
///
/// An implementation pulls characters via `next_char` until it has enough
/// to decide a sentence is complete, then returns it. It should return
/// `None` once `next_char` itself has returned `None` (the sentinel) and
/// there is no trailing partial sentence left to flush.
#[async_trait::async_trait]
pub trait SentenceBoundaryDetector: Send + Sync {
    /// Produce the next complete (or, at end-of-stream, trailing partial)
    /// sentence, pulling characters from `source` as needed.
    async fn next_sentence(&mut self, source: &dyn CharPull) -> Option<String>;
}

/// Object-safe view of [`CharSource`] handed to a boundary detector.
#[async_trait::async_trait]
pub trait CharPull: Send + Sync {
    /// Pull the next character, or `None` at end-of-stream.
    async fn pull(&self) -> Option<char>;
}

#[async_trait::async_trait]
impl CharPull for CharSource {
    async fn pull(&self) -> Option<char> {
        self.next_char().await
    }
}

/// Splits an incoming stream of words into sentences.
pub struct SentenceSegmenter {
    char_source: Arc<CharSource>,
    out: Arc<FrameQueue<SentenceChunk>>,
    cascade: Arc<InterruptCascade>,
}

impl SentenceSegmenter {
    /// Build a segmenter that commits sentences into `out` and shares
    /// interrupt state with `cascade`.
    pub fn new(out: Arc<FrameQueue<SentenceChunk>>, cascade: Arc<InterruptCascade>) -> Self {
        let segmenter = Self {
            char_source: Arc::new(CharSource::new()),
            out,
            cascade,
        };
        segmenter.wire_interrupt_passthrough();
        segmenter
    }

    fn wire_interrupt_passthrough(&self) {
        let char_source = self.char_source.clone();
        self.cascade.on_interrupt(move |_| {
            char_source.push_sentinel();
        });
    }

    /// Feed one incoming word's characters into the segmenter.
    pub fn push_word(&self, word: &str) {
        for c in word.chars() {
            self.char_source.push_char(c);
        }
        self.char_source.push_char(' ');
    }

    /// Signal that the upstream speaker has finished talking: flush
    /// whatever trailing partial sentence the detector is holding.
    pub fn signal_speech_end(&self) {
        self.char_source.push_sentinel();
    }

    /// Interrupt: clear pending characters under the lock, unblock the
    /// worker, and re-emit `interrupt` so anything downstream of this
    /// stage observes it too.
    pub fn interrupt(&self) {
        self.cascade.interrupt(|| self.char_source.clear());
    }

    /// Close the segmenter: push the sentinel so the worker loop's current
    /// `next_sentence` call unblocks and (once it sees no further input is
    /// coming) exits. The output queue is closed by `run` itself once the
    /// loop actually stops, not here — closing it synchronously would race
    /// a trailing flush still in flight on the worker.
    pub fn close(&self) {
        self.char_source.push_sentinel();
    }

    /// Run the worker loop against `detector` until closed. Spawn this with
    /// `tokio::task::spawn`. Closes the output queue exactly once, when the
    /// loop exits, whichever way it exits.
    pub async fn run(&self, mut detector: impl SentenceBoundaryDetector) {
        loop {
            let sentence = detector.next_sentence(self.char_source.as_ref()).await;
            match sentence {
                Some(text) if !self.cascade.is_interrupted() => {
                    if self.out.commit(SentenceChunk { text }, false).is_err() {
                        debug!("segmenter: output queue closed, stopping");
                        break;
                    }
                }
                Some(_) => {
                    // Interrupted: drop the sentence the detector was
                    // mid-way through rather than commit it downstream.
                }
                None => break,
            }
        }
        self.out.close();
    }
}
