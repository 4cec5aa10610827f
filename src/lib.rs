//! Single conversation sessions over hosted LLM chat backends.
//!
//! A [`ConversationSession`] keeps an ordered, role-tagged turn history and
//! runs one exchange at a time against a [`ModelClient`]. Clients exist for
//! the Gemini API (buffered, fragment-streaming, and server-side chat
//! styles) and the Groq API (streaming). A voice front end captures and
//! transcribes speech before it enters the session, and an
//! [`InteractionLoop`](interaction::InteractionLoop) drives the whole cycle
//! from an input seam to a renderer seam.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use chat_session::{ChatConfig, ConversationSession, ExchangeReply, GroqClient};
//!
//! # async fn run() -> chat_session::ChatResult<()> {
//! let config = ChatConfig::from_env("GROQ_API_KEY", "llama-3.3-70b-versatile")?;
//! let client = Arc::new(GroqClient::new(config)?);
//! let session = ConversationSession::start(client, Some("You are a helpful assistant."));
//!
//! match session.submit("What is the capital of France?").await? {
//!     ExchangeReply::Streaming(mut fragments) => {
//!         while let Some(fragment) = fragments.next().await {
//!             print!("{}", fragment?.text);
//!         }
//!     }
//!     ExchangeReply::Complete(reply) => println!("{reply}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Failures never retry automatically and never terminate the session; the
//! history accumulated so far survives every error.

pub mod auth;
pub mod config;
pub mod error;
pub mod interaction;
pub mod mocks;
pub mod provider;
pub mod session;
pub mod streaming;
pub mod transport;
pub mod types;
pub mod voice;

pub use config::ChatConfig;
pub use error::{CaptureError, ChatError, ChatResult};
pub use provider::{
    Capability, FragmentStream, GeminiChatHandle, GeminiClient, GroqClient, ModelClient,
};
pub use session::{ConversationSession, ExchangeReply, ExchangeStream};
pub use types::{Role, StreamFragment, Turn};
pub use voice::{CancelToken, CaptureConfig, VoiceInput};
