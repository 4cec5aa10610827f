//! Gemini backend clients.
//!
//! [`GeminiClient`] drives `generateContent` (buffered) and
//! `streamGenerateContent` (JSON-array stream) with the full history on
//! every call. [`GeminiChatHandle`] wraps the server-side chat style: the
//! handle accumulates the dialogue in its own mirror, each call carries
//! only the newest user message on top of it, and in streaming mode the
//! reply streams against that persistent history.

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{map_status_error, Capability, FragmentStream, ModelClient};
use crate::auth::{AuthProvider, HeaderKeyAuth};
use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::streaming::{JsonArrayParser, Utf8Decoder};
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport, TransportError};
use crate::types::{Role, StreamFragment, Turn};

/// Default Gemini API base URL.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_VERSION: &str = "v1beta";

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;
type Mirror = Arc<tokio::sync::Mutex<Vec<Turn>>>;

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl Content {
    fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Splits the history into the Gemini wire shape: the system turn becomes
/// `systemInstruction`, user turns keep role `user`, assistant turns become
/// role `model`.
fn build_request(config: &ChatConfig, history: &[Turn]) -> GenerateContentRequest {
    let mut system_instruction = None;
    let mut contents = Vec::with_capacity(history.len());

    for turn in history {
        match turn.role {
            Role::System => {
                system_instruction = Some(Content {
                    role: None,
                    parts: vec![Part {
                        text: turn.content.clone(),
                    }],
                });
            }
            Role::User | Role::Assistant => {
                contents.push(Content {
                    role: Some(wire_role(turn.role).to_string()),
                    parts: vec![Part {
                        text: turn.content.clone(),
                    }],
                });
            }
        }
    }

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: config.temperature.map(|temperature| GenerationConfig {
            temperature: Some(temperature),
        }),
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
        Role::System => "system",
    }
}

fn extract_reply(body: &[u8]) -> ChatResult<String> {
    let response: GenerateContentResponse = serde_json::from_slice(body)?;
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::malformed("response contains no candidates"))?;
    let content = candidate
        .content
        .ok_or_else(|| ChatError::malformed("candidate contains no content"))?;
    Ok(content.text())
}

async fn read_error_body(mut stream: ByteStream) -> ChatResult<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.map_err(ChatError::from)?);
    }
    Ok(body)
}

/// Turns the raw byte stream of a `streamGenerateContent` response into
/// fragments. Bytes are decoded strictly with an incomplete-tail carry, so
/// a code point split across network chunks reassembles exactly. When a
/// mirror is given, the assembled reply is appended to it as an assistant
/// turn once the stream completes cleanly.
fn decode_fragment_stream(mut byte_stream: ByteStream, mirror: Option<Mirror>) -> FragmentStream {
    let stream = try_stream! {
        let mut parser = JsonArrayParser::new();
        let mut decoder = Utf8Decoder::new();
        // One-fragment lookahead so the final fragment can carry the
        // terminal marker.
        let mut pending: Option<StreamFragment> = None;
        let mut assembled = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(ChatError::from)?;
            let text = decoder
                .decode(&bytes)
                .map_err(|e| ChatError::malformed(format!("invalid UTF-8 in stream: {e}")))?;
            for object in parser.feed(&text) {
                let reply = extract_reply(object.as_bytes())?;
                if let Some(fragment) = StreamFragment::new(reply) {
                    assembled.push_str(&fragment.text);
                    if let Some(ready) = pending.replace(fragment) {
                        yield ready;
                    }
                }
            }
        }

        if decoder.has_incomplete() {
            Err(ChatError::malformed("stream ended mid code point"))?;
        }
        if parser.has_partial() {
            Err(ChatError::malformed("stream ended mid-object"))?;
        }
        match pending {
            Some(last) => {
                if let Some(mirror) = mirror {
                    mirror.lock().await.push(Turn::assistant(assembled));
                }
                yield last.terminal();
            }
            None => Err(ChatError::malformed("stream contained no candidates"))?,
        }
    };
    Box::pin(stream)
}

/// Stateless Gemini client: the full history travels on every request.
///
/// Its [`Capability`] follows the configuration's `streaming` flag, so one
/// type covers both the buffered and the fragment-streaming styles.
pub struct GeminiClient {
    transport: Arc<dyn HttpTransport>,
    auth: HeaderKeyAuth,
    config: ChatConfig,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.config.model)
            .field("streaming", &self.config.streaming)
            .finish()
    }
}

impl GeminiClient {
    /// Creates a client from the configuration, building the default
    /// reqwest transport.
    pub fn new(config: ChatConfig) -> ChatResult<Self> {
        let base_url = config
            .base_url
            .as_ref()
            .map_or(GEMINI_BASE_URL.to_string(), |u| {
                u.as_str().trim_end_matches('/').to_string()
            });
        let transport =
            ReqwestTransport::new(base_url, config.timeout, config.connect_timeout)
                .map_err(|e| ChatError::configuration(e.to_string()))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a client over an injected transport.
    pub fn with_transport(config: ChatConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let auth = HeaderKeyAuth::new("x-goog-api-key", config.api_key.clone());
        Self {
            transport,
            auth,
            config,
        }
    }

    /// Converts this client into a server-side chat handle that owns the
    /// dialogue state. The handle keeps the configured delivery mode:
    /// streaming configurations stream against the handle's history.
    pub fn start_chat(self) -> GeminiChatHandle {
        GeminiChatHandle {
            inner: self,
            history: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    fn request_for(&self, operation: &str, history: &[Turn]) -> ChatResult<HttpRequest> {
        let body = serde_json::to_vec(&build_request(&self.config, history))
            .map_err(|e| ChatError::configuration(format!("request encoding failed: {e}")))?;
        let mut request = HttpRequest::post(format!(
            "{API_VERSION}/models/{}:{operation}",
            self.config.model
        ))
        .with_header("Content-Type", "application/json")
        .with_body(body);
        self.auth.apply_auth(&mut request.headers);
        Ok(request)
    }

    async fn send_complete(&self, history: &[Turn]) -> ChatResult<String> {
        let request = self.request_for("generateContent", history)?;
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(map_status_error(
                response.status,
                &self.config.model,
                &response.headers,
                &response.body,
            ));
        }

        debug!(bytes = response.body.len(), "received complete reply");
        extract_reply(&response.body)
    }

    async fn open_stream(&self, history: &[Turn]) -> ChatResult<ByteStream> {
        let request = self.request_for("streamGenerateContent", history)?;
        let response = self.transport.send_streaming(request).await?;
        if !(200..300).contains(&response.status) {
            let body = read_error_body(response.stream).await?;
            return Err(map_status_error(
                response.status,
                &self.config.model,
                &response.headers,
                &body,
            ));
        }
        Ok(response.stream)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn capability(&self) -> Capability {
        if self.config.streaming {
            Capability::Streaming
        } else {
            Capability::Complete
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, history), fields(model = %self.config.model))]
    async fn generate(&self, history: &[Turn]) -> ChatResult<String> {
        if self.config.streaming {
            return Err(ChatError::configuration(
                "client is configured for streaming; use generate_stream",
            ));
        }
        self.send_complete(history).await
    }

    #[instrument(skip(self, history), fields(model = %self.config.model))]
    async fn generate_stream(&self, history: &[Turn]) -> ChatResult<FragmentStream> {
        if !self.config.streaming {
            return Err(ChatError::configuration(
                "client is configured for buffered replies; use generate",
            ));
        }

        let byte_stream = self.open_stream(history).await?;
        Ok(decode_fragment_stream(byte_stream, None))
    }
}

/// Gemini server-side chat handle.
///
/// The handle owns the dialogue mirror; each call adopts only the newest
/// user message from the slice it is handed, on top of the mirror it keeps.
/// Delivery follows the configuration: buffered replies or fragments
/// streamed against the persistent history.
pub struct GeminiChatHandle {
    inner: GeminiClient,
    // Wire-shape mirror of the dialogue held by this handle.
    history: Mirror,
}

impl GeminiChatHandle {
    /// Creates a handle from the configuration.
    pub fn new(config: ChatConfig) -> ChatResult<Self> {
        Ok(GeminiClient::new(config)?.start_chat())
    }

    /// Creates a handle over an injected transport.
    pub fn with_transport(config: ChatConfig, transport: Arc<dyn HttpTransport>) -> Self {
        GeminiClient::with_transport(config, transport).start_chat()
    }

    /// Adopts the system turn (first call only) and the newest user turn
    /// from the caller's history into the mirror, returning a snapshot to
    /// send. On failure the user turn stays in the mirror, matching the
    /// session, which also retains it after a failed exchange.
    async fn adopt(&self, history: &[Turn]) -> ChatResult<Vec<Turn>> {
        let mut mirror = self.history.lock().await;
        if mirror.is_empty() {
            if let Some(system) = history.iter().find(|t| t.role == Role::System) {
                mirror.push(system.clone());
            }
        }
        let user = history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .ok_or_else(|| ChatError::malformed("history contains no user turn"))?;
        mirror.push(user.clone());
        Ok(mirror.clone())
    }
}

impl std::fmt::Debug for GeminiChatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiChatHandle")
            .field("model", &self.inner.config.model)
            .field("streaming", &self.inner.config.streaming)
            .finish()
    }
}

#[async_trait]
impl ModelClient for GeminiChatHandle {
    fn capability(&self) -> Capability {
        self.inner.capability()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    #[instrument(skip(self, history), fields(model = %self.inner.config.model))]
    async fn generate(&self, history: &[Turn]) -> ChatResult<String> {
        if self.inner.config.streaming {
            return Err(ChatError::configuration(
                "handle is configured for streaming; use generate_stream",
            ));
        }

        let snapshot = self.adopt(history).await?;
        let reply = self.inner.send_complete(&snapshot).await?;
        self.history.lock().await.push(Turn::assistant(reply.clone()));
        Ok(reply)
    }

    #[instrument(skip(self, history), fields(model = %self.inner.config.model))]
    async fn generate_stream(&self, history: &[Turn]) -> ChatResult<FragmentStream> {
        if !self.inner.config.streaming {
            return Err(ChatError::configuration(
                "handle is configured for buffered replies; use generate",
            ));
        }

        let snapshot = self.adopt(history).await?;
        let byte_stream = self.inner.open_stream(&snapshot).await?;
        Ok(decode_fragment_stream(byte_stream, Some(self.history.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> ChatConfig {
        ChatConfig::builder()
            .api_key(SecretString::new("test-key".into()))
            .model("gemini-2.0-pro")
            .temperature(0.7)
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_shape() {
        let history = vec![
            Turn::system("You are terse."),
            Turn::user("Hi"),
            Turn::assistant("Hello."),
            Turn::user("Weather?"),
        ];
        let request = build_request(&config(), &history);

        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[0].role.as_deref(), Some("user"));
        assert_eq!(request.contents[1].role.as_deref(), Some("model"));
        assert_eq!(request.contents[2].parts[0].text, "Weather?");
        assert_eq!(
            request.system_instruction.as_ref().unwrap().parts[0].text,
            "You are terse."
        );

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemInstruction").is_some());
        assert_eq!(json["generationConfig"]["temperature"], 0.7);
    }

    #[test]
    fn test_extract_reply_joins_parts() {
        let body = br#"{"candidates": [{"content": {"role": "model",
            "parts": [{"text": "Hel"}, {"text": "lo"}]}}]}"#;
        assert_eq!(extract_reply(body).unwrap(), "Hello");
    }

    #[test]
    fn test_extract_reply_no_candidates() {
        let result = extract_reply(br#"{"candidates": []}"#);
        assert!(matches!(result, Err(ChatError::MalformedResponse { .. })));
    }

    #[test]
    fn test_capability_follows_config() {
        let client = GeminiClient::new(config()).unwrap();
        assert_eq!(client.capability(), Capability::Complete);

        let streaming = ChatConfig::builder()
            .api_key(SecretString::new("k".into()))
            .model("gemini-2.5-flash")
            .streaming(true)
            .build()
            .unwrap();
        let client = GeminiClient::new(streaming).unwrap();
        assert_eq!(client.capability(), Capability::Streaming);
    }

    #[test]
    fn test_chat_handle_capability_follows_config() {
        let handle = GeminiChatHandle::new(config()).unwrap();
        assert_eq!(handle.capability(), Capability::Complete);

        let streaming = ChatConfig::builder()
            .api_key(SecretString::new("k".into()))
            .model("gemini-pro")
            .streaming(true)
            .build()
            .unwrap();
        let handle = GeminiChatHandle::new(streaming).unwrap();
        assert_eq!(handle.capability(), Capability::Streaming);
    }
}
