//! HTTP speech-to-text client.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use super::{AudioSegment, TranscriptionClient};
use crate::error::CaptureError;
use crate::transport::{HttpTransport, MultipartPart, MultipartRequest};

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcription client that POSTs the audio as a multipart form and reads
/// back a `{"text": ...}` body. Any transport or decode failure surfaces as
/// [`CaptureError::ServiceError`].
pub struct HttpRecognizer {
    transport: Arc<dyn HttpTransport>,
    path: String,
    language: Option<String>,
}

impl HttpRecognizer {
    /// Creates a recognizer posting to `path` on the given transport.
    pub fn new(transport: Arc<dyn HttpTransport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
            language: None,
        }
    }

    /// Sets a language hint sent alongside the audio.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

impl std::fmt::Debug for HttpRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRecognizer")
            .field("path", &self.path)
            .field("language", &self.language)
            .finish()
    }
}

#[async_trait]
impl TranscriptionClient for HttpRecognizer {
    #[instrument(skip(self, segment), fields(bytes = segment.data.len()))]
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String, CaptureError> {
        let mut parts = vec![MultipartPart::File {
            name: "file".to_string(),
            filename: "utterance.wav".to_string(),
            content_type: segment.content_type.clone(),
            data: segment.data.clone(),
        }];
        if let Some(language) = &self.language {
            parts.push(MultipartPart::Text {
                name: "language".to_string(),
                value: language.clone(),
            });
        }

        let request = MultipartRequest {
            path: self.path.clone(),
            headers: HashMap::new(),
            parts,
        };

        let response = self
            .transport
            .send_multipart(request)
            .await
            .map_err(|e| CaptureError::ServiceError {
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(CaptureError::ServiceError {
                message: format!(
                    "recognizer returned HTTP {}: {}",
                    response.status,
                    String::from_utf8_lossy(&response.body)
                ),
            });
        }

        let decoded: TranscriptionResponse =
            serde_json::from_slice(&response.body).map_err(|e| CaptureError::ServiceError {
                message: format!("malformed recognizer response: {e}"),
            })?;
        Ok(decoded.text)
    }
}
