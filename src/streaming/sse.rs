//! Server-Sent Events parsing for the Groq streaming format.

/// One Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type, when the server sent an `event:` field.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
}

/// Incremental SSE parser.
///
/// Feed arbitrary byte-boundary chunks to [`SseParser::parse`]; complete
/// events are returned as they close (blank line). Comment lines and unknown
/// fields are ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Creates a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a chunk of input, returning any events completed by it.
    pub fn parse(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.find(':') {
                Some(colon) => (&line[..colon], line[colon + 1..].trim_start()),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    /// Returns the in-progress event, if any, when the stream ends without
    /// a closing blank line.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            // A trailing newline makes parse() consume the leftover line.
            let mut events = self.parse(&format!("{rest}\n"));
            if let Some(event) = events.pop() {
                return Some(event);
            }
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
