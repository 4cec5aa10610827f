//! Model-client abstraction over the hosted backends.
//!
//! A [`ModelClient`] turns a conversation history into either one complete
//! assistant reply or an ordered stream of fragments, depending on its
//! declared [`Capability`]. The session checks the capability once at
//! exchange start and never mixes modes mid-exchange.

mod gemini;
mod groq;

pub use gemini::{GeminiChatHandle, GeminiClient, GEMINI_BASE_URL};
pub use groq::{GroqClient, GROQ_ALLOWED_MODELS, GROQ_BASE_URL};

use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{ChatError, ChatResult};
use crate::types::{StreamFragment, Turn};

/// How a client delivers its replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// One buffered reply per exchange via [`ModelClient::generate`].
    Complete,
    /// Ordered fragments per exchange via [`ModelClient::generate_stream`].
    Streaming,
}

/// Ordered stream of reply fragments from a single exchange.
pub type FragmentStream = Pin<Box<dyn Stream<Item = ChatResult<StreamFragment>> + Send>>;

/// A hosted model backend.
///
/// Implementations receive the full conversation history on every call and
/// hold no obligation to remember prior turns; a client that does keep
/// server-side state (the Gemini chat handle) still presents this interface.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// The delivery mode this client supports.
    fn capability(&self) -> Capability;

    /// The model identifier this client is bound to.
    fn model(&self) -> &str;

    /// Generates one complete reply for the given history.
    ///
    /// Clients whose capability is [`Capability::Streaming`] return
    /// [`ChatError::Configuration`] here.
    async fn generate(&self, history: &[Turn]) -> ChatResult<String>;

    /// Generates a fragment stream for the given history.
    ///
    /// Clients whose capability is [`Capability::Complete`] return
    /// [`ChatError::Configuration`] here.
    async fn generate_stream(&self, history: &[Turn]) -> ChatResult<FragmentStream>;
}

/// Maps a non-2xx backend status to the matching [`ChatError`] variant.
///
/// Shared by both backends: 401/403 reject the credential, 429 throttles
/// (honoring `retry-after` when present), 404/503 mean the model is missing
/// or down, and any other status is a transport-level failure.
pub(crate) fn map_status_error(
    status: u16,
    model: &str,
    headers: &HashMap<String, String>,
    body: &[u8],
) -> ChatError {
    let message = extract_error_message(body)
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        401 | 403 => ChatError::Authentication { message },
        429 => ChatError::RateLimit {
            message,
            retry_after: headers
                .get("retry-after")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        404 | 503 => ChatError::ModelUnavailable {
            model: model.to_string(),
            message,
        },
        _ => ChatError::Transport {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

/// Pulls a human-readable message out of a backend error body. Both
/// backends nest it under an `error` object; fall back to the raw body.
fn extract_error_message(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return Some(message.to_string());
        }
    }
    Some(String::from_utf8_lossy(body).into_owned())
}
