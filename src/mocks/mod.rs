//! Scripted doubles for the model, transport, recognizer, and audio seams.
//!
//! Used by the crate's own tests and available to downstream tests that
//! drive a session without a network. Each mock pops replies from a queue
//! in order; an exhausted queue surfaces as an error rather than a panic.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::error::{CaptureError, ChatError, ChatResult};
use crate::provider::{Capability, FragmentStream, ModelClient};
use crate::transport::{
    HttpRequest, HttpResponse, HttpTransport, MultipartRequest, StreamingResponse, TransportError,
};
use crate::types::{StreamFragment, Turn};
use crate::voice::{AudioSegment, AudioSource, CaptureConfig, TranscriptionClient};

enum ScriptedReply {
    Complete(ChatResult<String>),
    Fragments(Vec<ChatResult<StreamFragment>>),
}

/// Scripted [`ModelClient`]. Records every history it receives.
pub struct MockModelClient {
    capability: Capability,
    model: String,
    script: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<Vec<Turn>>>,
}

impl MockModelClient {
    /// Creates a buffered-reply mock.
    pub fn complete(model: impl Into<String>) -> Self {
        Self::new(Capability::Complete, model)
    }

    /// Creates a streaming mock.
    pub fn streaming(model: impl Into<String>) -> Self {
        Self::new(Capability::Streaming, model)
    }

    fn new(capability: Capability, model: impl Into<String>) -> Self {
        Self {
            capability,
            model: model.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a complete reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.push(ScriptedReply::Complete(Ok(reply.into())));
    }

    /// Queues an error for the next call, in either mode.
    pub fn push_error(&self, error: ChatError) {
        match self.capability {
            Capability::Complete => self.push(ScriptedReply::Complete(Err(error))),
            Capability::Streaming => self.push(ScriptedReply::Fragments(vec![Err(error)])),
        }
    }

    /// Queues a fragment sequence; the last fragment carries the terminal
    /// marker.
    pub fn push_fragments(&self, texts: &[&str]) {
        let mut fragments: Vec<ChatResult<StreamFragment>> = texts
            .iter()
            .filter_map(|t| StreamFragment::new(*t))
            .map(Ok)
            .collect();
        if let Some(Ok(last)) = fragments.pop() {
            fragments.push(Ok(last.terminal()));
        }
        self.push(ScriptedReply::Fragments(fragments));
    }

    /// Queues fragments followed by a mid-stream error, with no terminal
    /// fragment.
    pub fn push_fragments_then_error(&self, texts: &[&str], error: ChatError) {
        let mut fragments: Vec<ChatResult<StreamFragment>> = texts
            .iter()
            .filter_map(|t| StreamFragment::new(*t))
            .map(Ok)
            .collect();
        fragments.push(Err(error));
        self.push(ScriptedReply::Fragments(fragments));
    }

    /// The histories received so far, one per call, in call order.
    pub fn calls(&self) -> Vec<Vec<Turn>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, reply: ScriptedReply) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    fn pop(&self, history: &[Turn]) -> ChatResult<ScriptedReply> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(history.to_vec());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ChatError::transport("mock script exhausted"))
    }
}

impl std::fmt::Debug for MockModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockModelClient")
            .field("model", &self.model)
            .field("capability", &self.capability)
            .finish()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, history: &[Turn]) -> ChatResult<String> {
        match self.pop(history)? {
            ScriptedReply::Complete(result) => result,
            ScriptedReply::Fragments(_) => {
                Err(ChatError::configuration("scripted reply is a stream"))
            }
        }
    }

    async fn generate_stream(&self, history: &[Turn]) -> ChatResult<FragmentStream> {
        match self.pop(history)? {
            ScriptedReply::Fragments(fragments) => {
                Ok(Box::pin(futures::stream::iter(fragments)))
            }
            ScriptedReply::Complete(_) => {
                Err(ChatError::configuration("scripted reply is buffered"))
            }
        }
    }
}

enum ScriptedResponse {
    Buffered(HttpResponse),
    Streaming { status: u16, chunks: Vec<Vec<u8>> },
}

/// Scripted [`HttpTransport`]. Unlike wiremock, the streaming variant
/// hands the body to the client in exactly the chunks queued, so tests
/// control where the byte boundaries fall.
#[derive(Default)]
pub struct MockHttpTransport {
    script: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a buffered response.
    pub fn push_response(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.push(ScriptedResponse::Buffered(HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }));
    }

    /// Queues a streaming response delivered in exactly the given chunks.
    pub fn push_stream(&self, status: u16, chunks: &[&[u8]]) {
        self.push(ScriptedResponse::Streaming {
            status,
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
        });
    }

    /// The requests received so far, in call order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, response: ScriptedResponse) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    fn pop(&self, request: HttpRequest) -> Result<ScriptedResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| TransportError::Connection {
                message: "mock script exhausted".to_string(),
            })
    }
}

impl std::fmt::Debug for MockHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpTransport").finish()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        match self.pop(request)? {
            ScriptedResponse::Buffered(response) => Ok(response),
            ScriptedResponse::Streaming { .. } => Err(TransportError::InvalidResponse {
                message: "scripted response is a stream".to_string(),
            }),
        }
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        match self.pop(request)? {
            ScriptedResponse::Streaming { status, chunks } => Ok(StreamingResponse {
                status,
                headers: HashMap::new(),
                stream: Box::pin(futures::stream::iter(
                    chunks.into_iter().map(|c| Ok(Bytes::from(c))),
                )),
            }),
            ScriptedResponse::Buffered(_) => Err(TransportError::InvalidResponse {
                message: "scripted response is buffered".to_string(),
            }),
        }
    }

    async fn send_multipart(
        &self,
        _request: MultipartRequest,
    ) -> Result<HttpResponse, TransportError> {
        Err(TransportError::InvalidResponse {
            message: "multipart is not scripted".to_string(),
        })
    }
}

/// Scripted [`TranscriptionClient`].
#[derive(Debug, Default)]
pub struct MockTranscriber {
    script: Mutex<VecDeque<Result<String, CaptureError>>>,
}

impl MockTranscriber {
    /// Creates an empty transcriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a transcript.
    pub fn push_transcript(&self, text: impl Into<String>) {
        self.push(Ok(text.into()));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: CaptureError) {
        self.push(Err(error));
    }

    fn push(&self, result: Result<String, CaptureError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }
}

#[async_trait]
impl TranscriptionClient for MockTranscriber {
    async fn transcribe(&self, _segment: &AudioSegment) -> Result<String, CaptureError> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(CaptureError::ServiceError {
                    message: "mock script exhausted".to_string(),
                })
            })
    }
}

/// Scripted [`AudioSource`]. A queued `None` blocks forever, standing in
/// for a microphone that keeps listening until the capture is cancelled.
#[derive(Debug, Default)]
pub struct MockAudioSource {
    script: Mutex<VecDeque<Option<Result<AudioSegment, CaptureError>>>>,
}

impl MockAudioSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a recorded segment.
    pub fn push_segment(&self, segment: AudioSegment) {
        self.push(Some(Ok(segment)));
    }

    /// Queues a capture failure.
    pub fn push_error(&self, error: CaptureError) {
        self.push(Some(Err(error)));
    }

    /// Queues a recording that never finishes.
    pub fn push_blocking(&self) {
        self.push(None);
    }

    fn push(&self, entry: Option<Result<AudioSegment, CaptureError>>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(entry);
    }
}

#[async_trait]
impl AudioSource for MockAudioSource {
    async fn record(&self, _config: &CaptureConfig) -> Result<AudioSegment, CaptureError> {
        let entry = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match entry {
            Some(Some(result)) => result,
            Some(None) => future::pending().await,
            None => Err(CaptureError::DeviceError {
                message: "mock script exhausted".to_string(),
            }),
        }
    }
}
