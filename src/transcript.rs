//! Ordered conversation history shared by the whole agent.

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Mutex;
use std::time::Instant;

use tracing::info;

use crate::event_bus::{EventBus, EventPayload};

/// The role a past turn is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A human participant.
    User,
    /// The conversational AI.
    Assistant,
}

/// A completed turn in the conversation history.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Who spoke.
    pub role: Role,
    /// The accumulated text of the turn.
    pub content: String,
}

struct State {
    past_turns: Vec<Turn>,
    current_speaker: Option<String>,
    current_text: String,
    speaker_roles: HashMap<String, Role>,
    last_commit_at: Option<Instant>,
}

/// Event name fired when the speaking party changes.
pub const EVENT_SPEAKER_CHANGE: &str = "speaker_change";

/// The single ordered transcript every stage in the agent appends to.
///
/// Speaker-to-role classification is sticky: the first speaker name seen is
/// classified `User` unless explicitly marked AI on that very first word; an
/// AI-marked frame for a name already classified `User` never reclassifies
/// it, matching a human participant occasionally being quoted verbatim by
/// the model.
pub struct GlobalTranscript {
    state: Mutex<State>,
    bus: std::sync::Arc<EventBus>,
    log_sink: Mutex<Option<Box<dyn std::io::Write + Send>>>,
}

impl GlobalTranscript {
    /// Build an empty transcript that fires `speaker_change` on `bus`.
    pub fn new(bus: std::sync::Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(State {
                past_turns: Vec::new(),
                current_speaker: None,
                current_text: String::new(),
                speaker_roles: HashMap::new(),
                last_commit_at: None,
            }),
            bus,
            log_sink: Mutex::new(None),
        }
    }

    /// Attach a file (or any `Write`) that every committed word and speaker
    /// change is also rendered to.
    pub fn with_log_sink(self, sink: impl std::io::Write + Send + 'static) -> Self {
        *self.log_sink.lock().expect("log sink mutex poisoned") = Some(Box::new(sink));
        self
    }

    /// Append `word` spoken by `speaker`. `is_ai` classifies the speaker on
    /// first sight only. Closes the prior turn into history on a speaker
    /// change and fires `speaker_change` exactly at that boundary, before
    /// the new word is accumulated.
    pub fn commit_word(&self, speaker: &str, word: &str, is_ai: bool) {
        let mut state = self.state.lock().expect("transcript mutex poisoned");

        state
            .speaker_roles
            .entry(speaker.to_owned())
            .or_insert(if is_ai { Role::Assistant } else { Role::User });

        let changed = state.current_speaker.as_deref() != Some(speaker);
        if changed {
            let old = state.current_speaker.clone();
            let had_prior_speaker = old.is_some();
            if had_prior_speaker && !state.current_text.is_empty() {
                let role = state
                    .speaker_roles
                    .get(old.as_deref().unwrap_or_default())
                    .copied()
                    .unwrap_or(Role::User);
                state.past_turns.push(Turn {
                    role,
                    content: std::mem::take(&mut state.current_text),
                });
            } else {
                state.current_text.clear();
            }

            let elapsed = state
                .last_commit_at
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            state.current_speaker = Some(speaker.to_owned());

            let mut payload = EventPayload::empty()
                .with_string("new", speaker)
                .with_number("elapsed", elapsed);
            if let Some(old_name) = old {
                payload = payload.with_string("old", old_name);
            }
            self.write_log(&format!("\n{speaker}: "));
            // Fire while still holding the state lock: `commit_word` must be
            // fully serialized end-to-end, and `EventBus::trigger` already
            // snapshots its handler list before iterating (event_bus.rs), so
            // a reentrant handler calling back into the bus can't deadlock on
            // that snapshot the way it could on this state lock if we did.
            self.bus.trigger(EVENT_SPEAKER_CHANGE, &payload);
        }

        if !state.current_text.is_empty() && !word.is_empty() {
            state.current_text.push(' ');
        }
        state.current_text.push_str(word);
        state.last_commit_at = Some(Instant::now());
        self.write_log(word);
    }

    fn write_log(&self, text: &str) {
        let mut sink = self.log_sink.lock().expect("log sink mutex poisoned");
        if let Some(writer) = sink.as_mut() {
            let _ = writer.write_all(text.as_bytes());
            let _ = writer.flush();
        }
    }

    /// Past turns followed by the in-progress current turn (empty content
    /// if nothing has been said yet).
    pub fn get_transcript(&self) -> Vec<Turn> {
        let state = self.state.lock().expect("transcript mutex poisoned");
        let mut turns = state.past_turns.clone();
        if let Some(speaker) = &state.current_speaker {
            let role = state.speaker_roles.get(speaker).copied().unwrap_or(Role::User);
            turns.push(Turn {
                role,
                content: state.current_text.clone(),
            });
        }
        turns
    }

    /// The name of whoever is currently speaking, if anyone has spoken yet.
    pub fn current_speaker(&self) -> Option<String> {
        self.state
            .lock()
            .expect("transcript mutex poisoned")
            .current_speaker
            .clone()
    }

    /// Role classification for `speaker`, if known.
    pub fn role_of(&self, speaker: &str) -> Option<Role> {
        self.state
            .lock()
            .expect("transcript mutex poisoned")
            .speaker_roles
            .get(speaker)
            .copied()
    }
}

impl Default for GlobalTranscript {
    fn default() -> Self {
        info!("building transcript with a fresh event bus");
        Self::new(std::sync::Arc::new(EventBus::new()))
    }
}
