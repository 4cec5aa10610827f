//! Configuration for binding a session to a hosted model backend.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

use crate::error::{ChatError, ChatResult};

/// Default request timeout (120 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default sampling temperature when the caller does not set one.
pub const DEFAULT_TEMPERATURE: f64 = 0.6;

/// Configuration for one model binding: credential, model identifier,
/// sampling, and streaming flag.
///
/// The credential is held as a [`SecretString`]: never persisted, never
/// logged, scoped to the process lifetime of the session.
#[derive(Clone)]
pub struct ChatConfig {
    /// API key for the backend (required).
    pub api_key: SecretString,
    /// Model identifier. Backends may further validate against an allow-list.
    pub model: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: Option<f64>,
    /// Whether the caller wants incremental fragments.
    pub streaming: bool,
    /// Override for the backend base URL (tests point this at wiremock).
    pub base_url: Option<Url>,
    /// Request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
}

impl ChatConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }

    /// Creates a configuration from an environment variable holding the API
    /// key, e.g. `GEMINI_API_KEY` or `GROQ_API_KEY`.
    pub fn from_env(key_var: &str, model: impl Into<String>) -> ChatResult<Self> {
        let api_key = std::env::var(key_var)
            .map_err(|_| ChatError::configuration(format!("{key_var} is not set")))?;
        Self::builder()
            .api_key(SecretString::new(api_key))
            .model(model)
            .build()
    }
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("streaming", &self.streaming)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Builder for [`ChatConfig`].
#[derive(Default)]
pub struct ChatConfigBuilder {
    api_key: Option<SecretString>,
    model: Option<String>,
    temperature: Option<f64>,
    streaming: bool,
    base_url: Option<Url>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl ChatConfigBuilder {
    /// Sets the API key.
    pub fn api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Sets the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Requests incremental fragments from the backend.
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Overrides the backend base URL.
    pub fn base_url(mut self, base_url: &str) -> ChatResult<Self> {
        self.base_url = Some(Url::parse(base_url)?);
        Ok(self)
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds the configuration, validating required and bounded fields.
    pub fn build(self) -> ChatResult<ChatConfig> {
        let api_key = self
            .api_key
            .ok_or_else(|| ChatError::configuration("missing API key"))?;
        if api_key.expose_secret().trim().is_empty() {
            return Err(ChatError::configuration("API key is empty"));
        }

        let model = self
            .model
            .ok_or_else(|| ChatError::configuration("missing model identifier"))?;
        if model.trim().is_empty() {
            return Err(ChatError::configuration("model identifier is empty"));
        }

        if let Some(temp) = self.temperature {
            if !(0.0..=1.0).contains(&temp) {
                return Err(ChatError::configuration(format!(
                    "temperature must be in [0, 1], got {temp}"
                )));
            }
        }

        Ok(ChatConfig {
            api_key,
            model,
            temperature: self.temperature,
            streaming: self.streaming,
            base_url: self.base_url,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            connect_timeout: self
                .connect_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
        })
    }
}
