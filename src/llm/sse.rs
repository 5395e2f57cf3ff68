//! Minimal Server-Sent-Events parser for chat-completion streaming.
//!
//! OpenAI-compatible chat APIs stream `data: {...}\n\n` frames terminated
//! by `data: [DONE]`. This parser is a generic SSE line/event assembler
//! with no OpenAI-specific knowledge beyond recognizing the `[DONE]`
//! sentinel; the caller is responsible for interpreting `data` as JSON.

/// One parsed SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event_type: Option<String>,
    /// The concatenated `data:` lines, joined by `\n`.
    pub data: String,
    /// The `id:` field, if present.
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this event's data is the stream-termination sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

#[derive(Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
    saw_any_field: bool,
}

impl EventBuilder {
    fn push_field(&mut self, field: &str, value: &str) {
        self.saw_any_field = true;
        match field {
            "event" => self.event_type = Some(value.to_owned()),
            "data" => self.data_lines.push(value.to_owned()),
            "id" => self.id = Some(value.to_owned()),
            _ => {}
        }
    }

    fn take(&mut self) -> Option<SseEvent> {
        if !self.saw_any_field {
            return None;
        }
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data_lines.join("\n"),
            id: self.id.take(),
        };
        self.data_lines.clear();
        self.saw_any_field = false;
        Some(event)
    }
}

/// Parse a `field: value` SSE line. Lines without a colon are treated as
/// a field name with an empty value, per the spec; a leading space after
/// the colon is stripped.
fn parse_field(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
    }
}

/// Parse a complete SSE payload (one or more `\n\n`-delimited events) in
/// one shot.
pub fn parse_sse_text(text: &str) -> Vec<SseEvent> {
    let mut parser = SseLineParser::new();
    let mut events = parser.push(text);
    events.extend(parser.flush());
    events
}

/// Incremental SSE parser for streaming byte chunks that may split events
/// or even lines across chunk boundaries.
pub struct SseLineParser {
    carry: String,
    builder: EventBuilder,
}

impl SseLineParser {
    /// Build a fresh parser.
    pub fn new() -> Self {
        Self {
            carry: String::new(),
            builder: EventBuilder::default(),
        }
    }

    /// Feed a chunk of text, returning any complete events it produced.
    /// Partial trailing lines are buffered for the next call.
    pub fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.carry.push_str(chunk);
        let mut events = Vec::new();

        loop {
            let Some(newline_pos) = self.carry.find('\n') else {
                break;
            };
            let line: String = self.carry.drain(..=newline_pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);

            if line.is_empty() {
                if let Some(event) = self.builder.take() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue; // comment line
            }
            let (field, value) = parse_field(line);
            self.builder.push_field(field, value);
        }

        events
    }

    /// Flush any event left pending without a trailing blank line — used
    /// at end-of-stream.
    pub fn flush(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.carry.is_empty() {
            let remainder = std::mem::take(&mut self.carry);
            let (field, value) = parse_field(remainder.trim_end_matches(['\r', '\n']));
            if !field.is_empty() {
                self.builder.push_field(field, value);
            }
        }
        if let Some(event) = self.builder.take() {
            events.push(event);
        }
        events
    }
}

impl Default for SseLineParser {
    fn default() -> Self {
        Self::new()
    }
}
