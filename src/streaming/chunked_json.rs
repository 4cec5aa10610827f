//! Parser for Gemini's streamed JSON-array response format.
//!
//! `streamGenerateContent` returns a JSON array of response objects, and the
//! network delivers it split at arbitrary byte boundaries. The parser
//! buffers input and extracts each complete top-level object as it closes,
//! tracking brace depth and JSON string state so braces inside string
//! literals do not confuse it.

/// Incremental extractor of complete JSON objects from a streamed array.
#[derive(Debug, Default)]
pub struct JsonArrayParser {
    buffer: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
    object_start: Option<usize>,
}

impl JsonArrayParser {
    /// Creates a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of input and returns the JSON objects it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let start_at = self.buffer.len();
        self.buffer.push_str(chunk);

        let mut objects = Vec::new();
        let bytes = self.buffer.as_bytes();

        for i in start_at..bytes.len() {
            let byte = bytes[i];

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => {
                    if self.depth == 0 {
                        self.object_start = Some(i);
                    }
                    self.depth += 1;
                }
                b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        if let Some(start) = self.object_start.take() {
                            objects.push(self.buffer[start..=i].to_string());
                        }
                    }
                }
                // Array framing and separators between objects.
                _ => {}
            }
        }

        // Drop consumed input once no object is in progress.
        if self.depth == 0 && self.object_start.is_none() {
            self.buffer.clear();
        }

        objects
    }

    /// Returns true if a partial object remains buffered.
    pub fn has_partial(&self) -> bool {
        self.object_start.is_some()
    }
}
