//! The interaction loop.
//!
//! [`InteractionLoop`] drives a [`ConversationSession`] from an
//! [`InputSource`] to a [`Renderer`]. One cycle moves through
//! [`LoopState::AwaitingInput`], [`LoopState::Submitting`], and, for
//! streamed replies, [`LoopState::Streaming`], then returns to
//! [`LoopState::Idle`]. Errors are rendered and never terminate the loop;
//! the accumulated history survives them.

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tracing::{instrument, warn};

use crate::error::CaptureError;
use crate::session::{ConversationSession, ExchangeReply};
use crate::types::StreamFragment;

/// What the input side produced for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A user message to submit.
    Message(String),
    /// A request to clear the dialogue.
    Clear,
    /// A request to end the loop.
    Exit,
    /// Voice capture failed; the loop renders the failure and idles.
    CaptureFailed(CaptureError),
}

/// Produces one [`InputEvent`] per cycle. Typed input and voice capture
/// both sit behind this seam.
#[async_trait]
pub trait InputSource: Send {
    /// Waits for the next event.
    async fn next_event(&mut self) -> InputEvent;
}

/// Receives the loop's output.
pub trait Renderer: Send {
    /// Renders one reply fragment as it arrives.
    fn fragment(&mut self, text: &str);
    /// Renders a complete reply.
    fn reply(&mut self, text: &str);
    /// Renders an error message.
    fn error(&mut self, message: &str);
    /// Renders a status notice, e.g. that the dialogue was cleared.
    fn notice(&mut self, message: &str);
}

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Between cycles.
    Idle,
    /// Blocked on the input source.
    AwaitingInput,
    /// An exchange has been submitted and no fragment has arrived yet.
    Submitting,
    /// Fragments are being rendered.
    Streaming,
}

/// Drives a session from input events to rendered output.
pub struct InteractionLoop<I, R> {
    session: ConversationSession,
    input: I,
    renderer: R,
    state: LoopState,
}

impl<I, R> InteractionLoop<I, R>
where
    I: InputSource,
    R: Renderer,
{
    /// Creates a loop around the session.
    pub fn new(session: ConversationSession, input: I, renderer: R) -> Self {
        Self {
            session,
            input,
            renderer,
            state: LoopState::Idle,
        }
    }

    /// The loop's current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The session being driven.
    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    /// Runs one cycle. Returns `false` when the input source asked to exit.
    #[instrument(skip(self))]
    pub async fn run_once(&mut self) -> bool {
        self.state = LoopState::AwaitingInput;
        let event = self.input.next_event().await;

        match event {
            InputEvent::Exit => {
                self.state = LoopState::Idle;
                return false;
            }
            InputEvent::Clear => {
                match self.session.clear() {
                    Ok(()) => self.renderer.notice("Conversation cleared."),
                    Err(err) => self.renderer.error(&err.to_string()),
                }
            }
            InputEvent::CaptureFailed(err) => {
                self.renderer.error(&err.user_message());
            }
            InputEvent::Message(text) => {
                self.state = LoopState::Submitting;
                self.exchange(&text).await;
            }
        }

        self.state = LoopState::Idle;
        true
    }

    /// Runs cycles until the input source asks to exit.
    pub async fn run(&mut self) {
        while self.run_once().await {}
    }

    async fn exchange(&mut self, text: &str) {
        match self.session.submit(text).await {
            Ok(ExchangeReply::Complete(reply)) => self.renderer.reply(&reply),
            Ok(ExchangeReply::Streaming(mut fragments)) => {
                self.state = LoopState::Streaming;
                while let Some(item) = fragments.next().await {
                    match item {
                        Ok(fragment) => self.renderer.fragment(&fragment.text),
                        Err(err) => {
                            warn!(error = %err, "exchange failed mid-stream");
                            self.renderer.error(&err.to_string());
                            break;
                        }
                    }
                }
            }
            Err(err) => self.renderer.error(&err.to_string()),
        }
    }
}

/// Re-chunks a complete reply into fragments for a typing effect.
///
/// A presentation concern only: the assistant turn is already recorded in
/// full, and this stream merely paces its display. Splits on character
/// boundaries, never inside a code point.
pub fn reveal_incrementally(
    text: String,
    chunk_chars: usize,
    delay: Duration,
) -> impl Stream<Item = StreamFragment> {
    stream! {
        let chunk_chars = chunk_chars.max(1);
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = chars
            .chunks(chunk_chars)
            .map(|c| c.iter().collect::<String>())
            .peekable();

        while let Some(chunk) = chunks.next() {
            if let Some(fragment) = StreamFragment::new(chunk) {
                if chunks.peek().is_none() {
                    yield fragment.terminal();
                } else {
                    yield fragment;
                }
            }
            if chunks.peek().is_some() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reveal_concatenates_to_original() {
        let fragments: Vec<StreamFragment> =
            reveal_incrementally("The weather is sunny.".to_string(), 4, Duration::ZERO)
                .collect()
                .await;
        let joined: String = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(joined, "The weather is sunny.");
        assert!(fragments.last().unwrap().is_last);
        assert!(fragments[..fragments.len() - 1].iter().all(|f| !f.is_last));
    }

    #[tokio::test]
    async fn test_reveal_respects_char_boundaries() {
        let fragments: Vec<StreamFragment> =
            reveal_incrementally("héllo wörld".to_string(), 3, Duration::ZERO)
                .collect()
                .await;
        let joined: String = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(joined, "héllo wörld");
    }

    #[tokio::test]
    async fn test_reveal_empty_text_yields_nothing() {
        let fragments: Vec<StreamFragment> =
            reveal_incrementally(String::new(), 4, Duration::ZERO)
                .collect()
                .await;
        assert!(fragments.is_empty());
    }
}
