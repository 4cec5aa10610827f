//! HTTP transport layer.
//!
//! Services talk to [`HttpTransport`] rather than to reqwest directly so
//! they can be exercised against the in-crate mock transport and wiremock.

mod http;

pub use http::{HttpTransportImpl, ReqwestTransport};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use crate::error::ChatError;

/// Transport-level failure, mapped to [`ChatError::Transport`] at the
/// service boundary.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// The request exceeded its timeout.
    #[error("Request timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The response could not be read.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Description of the read failure.
        message: String,
    },
}

impl From<TransportError> for ChatError {
    fn from(err: TransportError) -> Self {
        ChatError::Transport {
            message: err.to_string(),
        }
    }
}

/// HTTP request representation.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Path and query relative to the transport base URL.
    pub path: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// JSON request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a POST request for the given path.
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lower-cased names.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true if the status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Streaming HTTP response: status, headers, and the raw byte stream.
pub struct StreamingResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lower-cased names.
    pub headers: HashMap<String, String>,
    /// Byte stream of the response body.
    pub stream: Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>,
}

/// One part of a multipart form request.
#[derive(Debug, Clone)]
pub enum MultipartPart {
    /// A plain text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A file field.
    File {
        /// Field name.
        name: String,
        /// File name reported to the server.
        filename: String,
        /// Content type of the data.
        content_type: String,
        /// Raw file bytes.
        data: Vec<u8>,
    },
}

/// A multipart form request (audio upload to the recognizer).
#[derive(Debug, Clone)]
pub struct MultipartRequest {
    /// Path relative to the transport base URL.
    pub path: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Form parts.
    pub parts: Vec<MultipartPart>,
}

/// HTTP transport trait.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and buffers the full response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Sends a request and returns the response body as a byte stream.
    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError>;

    /// Sends a multipart form request.
    async fn send_multipart(
        &self,
        request: MultipartRequest,
    ) -> Result<HttpResponse, TransportError>;
}
