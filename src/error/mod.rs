//! Error types for the chat-session crate.
//!
//! Two taxonomies: [`ChatError`] covers configuration, session misuse, and
//! remote-model failures; [`CaptureError`] covers the voice-capture path.
//! Remote failures are surfaced per exchange and never retried automatically.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Error type for session and model-client operations.
#[derive(Error, Debug, Clone)]
pub enum ChatError {
    /// Bad setup: missing or malformed credential, model, or parameter.
    /// Fatal to session start, not retryable.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is missing or malformed.
        message: String,
    },

    /// The submitted user text was empty after trimming. No turn was
    /// appended and no network call was made.
    #[error("Empty input: user text is empty after trimming")]
    EmptyInput,

    /// An exchange is already in flight on this session. The session accepts
    /// exactly one in-flight request; drain or drop the current exchange
    /// stream first.
    #[error("Session busy: an exchange is already in flight")]
    SessionBusy,

    /// The backend rejected the credential.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message from the backend.
        message: String,
    },

    /// The backend throttled the request.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        /// Error message from the backend.
        message: String,
        /// Suggested wait before the caller retries manually.
        retry_after: Option<Duration>,
    },

    /// The requested model does not exist or is temporarily unavailable.
    #[error("Model unavailable: {model}: {message}")]
    ModelUnavailable {
        /// The model identifier that failed.
        model: String,
        /// Error message from the backend.
        message: String,
    },

    /// Network-level failure: connect, timeout, or a broken stream.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the underlying failure.
        message: String,
    },

    /// The backend returned a body or chunk that could not be decoded.
    #[error("Malformed response: {message}")]
    MalformedResponse {
        /// Description of the decoding failure.
        message: String,
    },
}

impl ChatError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        ChatError::Configuration {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        ChatError::Transport {
            message: message.into(),
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        ChatError::MalformedResponse {
            message: message.into(),
        }
    }

    /// True when the error was produced before any network call and the
    /// caller can correct it immediately.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ChatError::Configuration { .. } | ChatError::EmptyInput | ChatError::SessionBusy
        )
    }

    /// Suggested wait before the caller retries manually, when the backend
    /// provided one. The session itself never retries.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ChatError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::MalformedResponse {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for ChatError {
    fn from(err: url::ParseError) -> Self {
        ChatError::Configuration {
            message: format!("invalid base URL: {err}"),
        }
    }
}

/// Error type for the voice-capture path.
///
/// These errors occur before `submit` is ever called, so they never touch
/// session state. Each maps to a distinct user-visible message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Silence through the speech-onset timeout.
    #[error("No speech detected before the listening timeout")]
    NoSpeechDetected,

    /// Speech was present but the recognizer produced no text.
    #[error("Speech could not be recognized")]
    UnintelligibleAudio,

    /// The recognizer backend was unreachable or returned an error.
    #[error("Speech recognition service error: {message}")]
    ServiceError {
        /// Description of the recognizer failure.
        message: String,
    },

    /// No microphone, or the capture device failed.
    #[error("Audio device error: {message}")]
    DeviceError {
        /// Description of the device failure.
        message: String,
    },

    /// Capture was cancelled via a [`crate::voice::CancelToken`].
    #[error("Voice capture cancelled")]
    Cancelled,
}

impl CaptureError {
    /// The message to render to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::NoSpeechDetected => {
                "No speech detected. Please try again.".to_string()
            }
            CaptureError::UnintelligibleAudio => {
                "Could not understand the speech. Please try again.".to_string()
            }
            CaptureError::ServiceError { message } => {
                format!("Error with speech recognition: {message}")
            }
            CaptureError::DeviceError { message } => format!("Microphone error: {message}"),
            CaptureError::Cancelled => "Voice capture cancelled.".to_string(),
        }
    }
}
