//! Groq backend client.
//!
//! Streams `chat/completions` deltas over Server-Sent Events, terminated by
//! a `[DONE]` marker. The model identifier is validated against a fixed
//! allow-list before any request is made.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use super::{map_status_error, Capability, FragmentStream, ModelClient};
use crate::auth::{AuthProvider, BearerKeyAuth};
use crate::config::{ChatConfig, DEFAULT_TEMPERATURE};
use crate::error::{ChatError, ChatResult};
use crate::streaming::{SseParser, Utf8Decoder};
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};
use crate::types::{Role, StreamFragment, Turn};

/// Default Groq API base URL.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Models this client accepts. Anything else is rejected at construction.
pub const GROQ_ALLOWED_MODELS: &[&str] = &[
    "gemma2-9b-it",
    "llama-3.3-70b-versatile",
    "llama-3.1-8b-instant",
];

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn build_request(config: &ChatConfig, history: &[Turn]) -> ChatRequest {
    ChatRequest {
        model: config.model.clone(),
        messages: history
            .iter()
            .map(|turn| Message {
                role: wire_role(turn.role),
                content: turn.content.clone(),
            })
            .collect(),
        temperature: config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        stream: true,
    }
}

/// Streaming Groq client.
pub struct GroqClient {
    transport: Arc<dyn HttpTransport>,
    auth: BearerKeyAuth,
    config: ChatConfig,
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("model", &self.config.model)
            .finish()
    }
}

impl GroqClient {
    /// Creates a client from the configuration, building the default
    /// reqwest transport.
    pub fn new(config: ChatConfig) -> ChatResult<Self> {
        let base_url = config
            .base_url
            .as_ref()
            .map_or(GROQ_BASE_URL.to_string(), |u| {
                u.as_str().trim_end_matches('/').to_string()
            });
        let transport =
            ReqwestTransport::new(base_url, config.timeout, config.connect_timeout)
                .map_err(|e| ChatError::configuration(e.to_string()))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client over an injected transport.
    pub fn with_transport(
        config: ChatConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> ChatResult<Self> {
        if !GROQ_ALLOWED_MODELS.contains(&config.model.as_str()) {
            return Err(ChatError::configuration(format!(
                "model {} is not in the supported set: {}",
                config.model,
                GROQ_ALLOWED_MODELS.join(", ")
            )));
        }
        let auth = BearerKeyAuth::new(config.api_key.clone());
        Ok(Self {
            transport,
            auth,
            config,
        })
    }
}

#[async_trait]
impl ModelClient for GroqClient {
    fn capability(&self) -> Capability {
        Capability::Streaming
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, _history: &[Turn]) -> ChatResult<String> {
        Err(ChatError::configuration(
            "client delivers streamed replies only; use generate_stream",
        ))
    }

    #[instrument(skip(self, history), fields(model = %self.config.model))]
    async fn generate_stream(&self, history: &[Turn]) -> ChatResult<FragmentStream> {
        let body = serde_json::to_vec(&build_request(&self.config, history))
            .map_err(|e| ChatError::configuration(format!("request encoding failed: {e}")))?;
        let mut request = HttpRequest::post("chat/completions")
            .with_header("Content-Type", "application/json")
            .with_body(body);
        self.auth.apply_auth(&mut request.headers);

        let response = self.transport.send_streaming(request).await?;
        if !(200..300).contains(&response.status) {
            let mut error_body = Vec::new();
            let mut byte_stream = response.stream;
            while let Some(chunk) = byte_stream.next().await {
                error_body.extend_from_slice(&chunk.map_err(ChatError::from)?);
            }
            return Err(map_status_error(
                response.status,
                &self.config.model,
                &response.headers,
                &error_body,
            ));
        }

        let mut byte_stream = response.stream;
        let stream = try_stream! {
            let mut parser = SseParser::new();
            let mut decoder = Utf8Decoder::new();
            // One-fragment lookahead so the final fragment can carry the
            // terminal marker.
            let mut pending: Option<StreamFragment> = None;
            let mut done = false;

            'outer: while let Some(chunk) = byte_stream.next().await {
                let bytes = chunk.map_err(ChatError::from)?;
                let text = decoder
                    .decode(&bytes)
                    .map_err(|e| ChatError::malformed(format!("invalid UTF-8 in stream: {e}")))?;
                for event in parser.parse(&text) {
                    if event.data == DONE_MARKER {
                        done = true;
                        break 'outer;
                    }
                    if let Some(fragment) = delta_fragment(&event.data)? {
                        if let Some(ready) = pending.replace(fragment) {
                            yield ready;
                        }
                    }
                }
            }

            if decoder.has_incomplete() {
                Err(ChatError::malformed("stream ended mid code point"))?;
            }
            // Some servers skip the blank line after the last event; an
            // unterminated trailing event still counts.
            if !done {
                if let Some(event) = parser.flush() {
                    if event.data == DONE_MARKER {
                        done = true;
                    } else if let Some(fragment) = delta_fragment(&event.data)? {
                        if let Some(ready) = pending.replace(fragment) {
                            yield ready;
                        }
                    }
                }
            }
            if !done {
                Err(ChatError::malformed("stream ended without [DONE]"))?;
            }
            match pending {
                Some(last) => yield last.terminal(),
                None => Err(ChatError::malformed("stream contained no deltas"))?,
            }
        };

        Ok(Box::pin(stream))
    }
}

fn delta_fragment(data: &str) -> ChatResult<Option<StreamFragment>> {
    let chunk: ChatChunk = serde_json::from_str(data)?;
    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content);
    Ok(text.and_then(StreamFragment::new))
}
