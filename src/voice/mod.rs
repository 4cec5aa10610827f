//! Voice capture and transcription.
//!
//! The capture path runs entirely before the session is touched: record a
//! segment from an [`AudioSource`], transcribe it with a
//! [`TranscriptionClient`], and only a non-empty transcript ever reaches
//! `submit`. Every failure maps to a distinct [`CaptureError`], and a
//! [`CancelToken`] lets the caller abandon a capture that is still
//! listening.

mod recognizer;

pub use recognizer::HttpRecognizer;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, instrument};

use crate::error::CaptureError;

/// Default wait for speech to begin (10 seconds).
pub const DEFAULT_ONSET_TIMEOUT_SECS: u64 = 10;

/// Default cap on a single utterance (30 seconds).
pub const DEFAULT_MAX_UTTERANCE_SECS: u64 = 30;

/// Timing bounds for one capture.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// How long to wait for speech to begin before giving up.
    pub onset_timeout: Duration,
    /// Hard cap on utterance length once speech has begun.
    pub max_utterance: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            onset_timeout: Duration::from_secs(DEFAULT_ONSET_TIMEOUT_SECS),
            max_utterance: Duration::from_secs(DEFAULT_MAX_UTTERANCE_SECS),
        }
    }
}

/// One recorded utterance.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    /// Encoded audio bytes.
    pub data: Vec<u8>,
    /// MIME type of the encoding, e.g. `audio/wav`.
    pub content_type: String,
}

impl AudioSegment {
    /// Creates a WAV segment.
    pub fn wav(data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: "audio/wav".to_string(),
        }
    }
}

/// A microphone or other audio producer.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Records one utterance within the configured bounds.
    ///
    /// Returns [`CaptureError::NoSpeechDetected`] when the onset timeout
    /// elapses in silence and [`CaptureError::DeviceError`] when the device
    /// is missing or fails.
    async fn record(&self, config: &CaptureConfig) -> Result<AudioSegment, CaptureError>;
}

/// A speech-to-text backend.
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Transcribes one segment. An empty transcript is a valid return; the
    /// caller decides how to treat it.
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String, CaptureError>;
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation handle for an in-progress capture.
///
/// Cloning yields handles to the same token; cancelling is sticky.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token, waking any capture waiting on it.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// True once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Capture-then-transcribe front end over an [`AudioSource`] and a
/// [`TranscriptionClient`].
///
/// Implements the interaction loop's
/// [`InputSource`](crate::interaction::InputSource) seam, so a session can
/// be driven by voice the same way it is driven by typed text.
pub struct VoiceInput<S, T> {
    source: S,
    recognizer: T,
    config: CaptureConfig,
    cancel: CancelToken,
}

impl<S, T> VoiceInput<S, T>
where
    S: AudioSource,
    T: TranscriptionClient,
{
    /// Creates a voice input with default timing bounds.
    pub fn new(source: S, recognizer: T) -> Self {
        Self::with_config(source, recognizer, CaptureConfig::default())
    }

    /// Creates a voice input with explicit timing bounds.
    pub fn with_config(source: S, recognizer: T, config: CaptureConfig) -> Self {
        Self {
            source,
            recognizer,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// A handle that cancels captures on this input from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Records one utterance and transcribes it.
    ///
    /// Returns [`CaptureError::Cancelled`] if the cancel token fires while
    /// the capture is still listening, and
    /// [`CaptureError::UnintelligibleAudio`] when the recognizer returns an
    /// empty transcript.
    #[instrument(skip(self))]
    pub async fn capture(&self) -> Result<String, CaptureError> {
        if self.cancel.is_cancelled() {
            return Err(CaptureError::Cancelled);
        }

        let segment = tokio::select! {
            () = self.cancel.cancelled() => return Err(CaptureError::Cancelled),
            segment = self.source.record(&self.config) => segment?,
        };
        debug!(bytes = segment.data.len(), "captured utterance");

        let transcript = self.recognizer.transcribe(&segment).await?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(CaptureError::UnintelligibleAudio);
        }
        Ok(transcript.to_string())
    }
}

#[async_trait]
impl<S, T> crate::interaction::InputSource for VoiceInput<S, T>
where
    S: AudioSource,
    T: TranscriptionClient,
{
    async fn next_event(&mut self) -> crate::interaction::InputEvent {
        use crate::interaction::InputEvent;

        match self.capture().await {
            Ok(text) => InputEvent::Message(text),
            Err(CaptureError::Cancelled) => InputEvent::Exit,
            Err(err) => InputEvent::CaptureFailed(err),
        }
    }
}
