//! Wire-format parsers for the two streaming styles the backends use.
//!
//! Groq streams Server-Sent Events terminated by a `[DONE]` marker; Gemini
//! streams a JSON array with one response object per element, split at
//! arbitrary byte boundaries. Both parsers buffer partial input and emit
//! complete units as they become available.

mod chunked_json;
mod sse;
mod utf8;

pub use chunked_json::JsonArrayParser;
pub use sse::{SseEvent, SseParser};
pub use utf8::Utf8Decoder;
