//! Incremental UTF-8 decoding for byte streams.
//!
//! Network chunks split responses at arbitrary byte boundaries, including
//! inside a multi-byte code point. Decoding each chunk independently would
//! turn a split code point into replacement characters; the decoder instead
//! carries the incomplete tail into the next chunk and decodes strictly,
//! surfacing genuinely invalid bytes as an error.

use std::str::Utf8Error;

/// Strict UTF-8 decoder that buffers an incomplete trailing code point
/// between chunks.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Creates a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a chunk, returning the complete text it closed (possibly
    /// empty when the chunk ends mid code point). Invalid bytes are an
    /// error, never replaced.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, Utf8Error> {
        self.pending.extend_from_slice(chunk);
        match String::from_utf8(std::mem::take(&mut self.pending)) {
            Ok(text) => Ok(text),
            Err(err) => {
                let utf8_err = err.utf8_error();
                if utf8_err.error_len().is_some() {
                    return Err(utf8_err);
                }
                // Incomplete trailing code point: decode the valid prefix
                // and keep the tail for the next chunk.
                let mut bytes = err.into_bytes();
                let tail = bytes.split_off(utf8_err.valid_up_to());
                self.pending = tail;
                String::from_utf8(bytes).map_err(|e| e.utf8_error())
            }
        }
    }

    /// True when the stream ended with an unfinished code point buffered.
    pub fn has_incomplete(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"hello").unwrap(), "hello");
        assert!(!decoder.has_incomplete());
    }

    #[test]
    fn test_code_point_split_across_chunks() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "héllo".as_bytes();
        // Split between the two bytes of 'é'.
        let first = decoder.decode(&bytes[..2]).unwrap();
        assert_eq!(first, "h");
        assert!(decoder.has_incomplete());
        let second = decoder.decode(&bytes[2..]).unwrap();
        assert_eq!(second, "éllo");
        assert!(!decoder.has_incomplete());
    }

    #[test]
    fn test_four_byte_code_point_split_three_ways() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "a🙂b".as_bytes();
        let mut out = String::new();
        out.push_str(&decoder.decode(&bytes[..2]).unwrap());
        out.push_str(&decoder.decode(&bytes[2..4]).unwrap());
        out.push_str(&decoder.decode(&bytes[4..]).unwrap());
        assert_eq!(out, "a🙂b");
    }

    #[test]
    fn test_invalid_bytes_are_an_error() {
        let mut decoder = Utf8Decoder::new();
        assert!(decoder.decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_truncated_stream_is_detected() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "é".as_bytes();
        decoder.decode(&bytes[..1]).unwrap();
        assert!(decoder.has_incomplete());
    }
}
