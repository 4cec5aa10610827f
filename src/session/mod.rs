//! Conversation sessions.
//!
//! A [`ConversationSession`] owns an ordered, append-only turn history and
//! accepts exactly one in-flight exchange at a time. The client's
//! [`Capability`] is checked once when an exchange starts; a streamed
//! exchange hands back an [`ExchangeStream`] that finalizes the assistant
//! turn when it drains, fails, or is dropped.

use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tracing::{debug, instrument, warn};

use crate::error::{ChatError, ChatResult};
use crate::provider::{Capability, FragmentStream, ModelClient};
use crate::types::{Role, StreamFragment, Turn};

struct SessionState {
    history: Vec<Turn>,
    busy: bool,
    client: Arc<dyn ModelClient>,
}

/// Shared handle to the state, also held by an in-flight [`ExchangeStream`].
type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &SharedState) -> std::sync::MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The session's answer to a submitted message, shaped by the client's
/// capability.
pub enum ExchangeReply {
    /// The complete assistant reply; the matching turn is already appended.
    Complete(String),
    /// An ordered fragment stream; the assistant turn is appended when the
    /// stream finishes.
    Streaming(ExchangeStream),
}

impl std::fmt::Debug for ExchangeReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeReply::Complete(reply) => {
                f.debug_tuple("Complete").field(&reply.len()).finish()
            }
            ExchangeReply::Streaming(_) => f.debug_tuple("Streaming").finish(),
        }
    }
}

/// A single conversation bound to one model client.
pub struct ConversationSession {
    state: SharedState,
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ConversationSession")
            .field("model", &state.client.model())
            .field("turns", &state.history.len())
            .field("busy", &state.busy)
            .finish()
    }
}

impl ConversationSession {
    /// Starts a session. When a system prompt is given it becomes the first
    /// turn and survives [`ConversationSession::clear`].
    pub fn start(client: Arc<dyn ModelClient>, system_prompt: Option<&str>) -> Self {
        let mut history = Vec::new();
        if let Some(prompt) = system_prompt {
            history.push(Turn::system(prompt));
        }
        Self {
            state: Arc::new(Mutex::new(SessionState {
                history,
                busy: false,
                client,
            })),
        }
    }

    /// Submits one user message and runs the exchange.
    ///
    /// Input is trimmed first; empty input is rejected with
    /// [`ChatError::EmptyInput`] before any state changes. The user turn is
    /// appended before the network call and is retained even when the
    /// exchange fails.
    #[instrument(skip(self, text))]
    pub async fn submit(&self, text: &str) -> ChatResult<ExchangeReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyInput);
        }

        // Claim the busy flag and snapshot the history in one critical
        // section; the network call runs outside the lock.
        let (client, history) = {
            let mut state = lock(&self.state);
            if state.busy {
                return Err(ChatError::SessionBusy);
            }
            state.busy = true;
            state.history.push(Turn::user(text));
            (state.client.clone(), state.history.clone())
        };

        match client.capability() {
            Capability::Complete => {
                let result = client.generate(&history).await;
                let mut state = lock(&self.state);
                state.busy = false;
                match result {
                    Ok(reply) => {
                        state.history.push(Turn::assistant(reply.clone()));
                        debug!(turns = state.history.len(), "exchange complete");
                        Ok(ExchangeReply::Complete(reply))
                    }
                    Err(err) => {
                        // The user turn stays; only successful exchanges
                        // extend the history with an assistant turn.
                        Err(err)
                    }
                }
            }
            Capability::Streaming => {
                match client.generate_stream(&history).await {
                    Ok(fragments) => Ok(ExchangeReply::Streaming(ExchangeStream {
                        fragments,
                        state: self.state.clone(),
                        assembled: String::new(),
                        finished: false,
                    })),
                    Err(err) => {
                        lock(&self.state).busy = false;
                        Err(err)
                    }
                }
            }
        }
    }

    /// Clears the dialogue, keeping the system turn if one was set.
    ///
    /// Rejected with [`ChatError::SessionBusy`] while an exchange is in
    /// flight. Idempotent otherwise.
    pub fn clear(&self) -> ChatResult<()> {
        let mut state = lock(&self.state);
        if state.busy {
            return Err(ChatError::SessionBusy);
        }
        state.history.retain(|turn| turn.role == Role::System);
        Ok(())
    }

    /// Swaps the model client. The history is kept; the next exchange uses
    /// the new client. Rejected while an exchange is in flight.
    pub fn replace_client(&self, client: Arc<dyn ModelClient>) -> ChatResult<()> {
        let mut state = lock(&self.state);
        if state.busy {
            return Err(ChatError::SessionBusy);
        }
        state.client = client;
        Ok(())
    }

    /// Returns a snapshot of the history in append order.
    pub fn history(&self) -> Vec<Turn> {
        lock(&self.state).history.clone()
    }

    /// True while an exchange is in flight.
    pub fn is_busy(&self) -> bool {
        lock(&self.state).busy
    }
}

/// Fragment stream for one in-flight exchange.
///
/// Yields the client's fragments unchanged while assembling them. When the
/// stream drains it appends the assembled assistant turn and releases the
/// session. On a mid-stream error, or if the stream is dropped early, the
/// fragments received so far become a truncated assistant turn (none, if no
/// fragment arrived) and the session is released.
pub struct ExchangeStream {
    fragments: FragmentStream,
    state: SharedState,
    assembled: String,
    finished: bool,
}

impl ExchangeStream {
    /// The fragment text received so far, concatenated in arrival order.
    pub fn assembled(&self) -> &str {
        &self.assembled
    }

    fn finalize_complete(&mut self) {
        self.finished = true;
        let mut state = lock(&self.state);
        state
            .history
            .push(Turn::assistant(std::mem::take(&mut self.assembled)));
        state.busy = false;
        debug!(turns = state.history.len(), "streamed exchange complete");
    }

    fn finalize_truncated(&mut self) {
        self.finished = true;
        let mut state = lock(&self.state);
        if !self.assembled.is_empty() {
            state
                .history
                .push(Turn::assistant_truncated(std::mem::take(
                    &mut self.assembled,
                )));
        }
        state.busy = false;
    }
}

impl Stream for ExchangeStream {
    type Item = ChatResult<StreamFragment>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.fragments.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(fragment))) => {
                self.assembled.push_str(&fragment.text);
                if fragment.is_last {
                    self.finalize_complete();
                }
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(err))) => {
                self.finalize_truncated();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                // Backends mark the last fragment; a bare end of stream
                // means the reply was cut off.
                self.finalize_truncated();
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for ExchangeStream {
    fn drop(&mut self) {
        if !self.finished {
            warn!("exchange stream dropped before draining");
            self.finalize_truncated();
        }
    }
}

impl std::fmt::Debug for ExchangeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeStream")
            .field("assembled_len", &self.assembled.len())
            .field("finished", &self.finished)
            .finish()
    }
}
