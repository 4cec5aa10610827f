//! Credential handling for backend requests.
//!
//! The API key is applied to outgoing headers by an [`AuthProvider`]; the
//! key itself stays inside a `SecretString` and is redacted from `Debug`.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Applies a credential to outgoing request headers.
pub trait AuthProvider: Send + Sync {
    /// Inserts the authentication header(s) into `headers`.
    fn apply_auth(&self, headers: &mut HashMap<String, String>);
}

/// Bearer-token authentication (Groq style).
pub struct BearerKeyAuth {
    api_key: SecretString,
}

impl BearerKeyAuth {
    /// Creates a new bearer-token provider.
    pub fn new(api_key: SecretString) -> Self {
        Self { api_key }
    }
}

impl AuthProvider for BearerKeyAuth {
    fn apply_auth(&self, headers: &mut HashMap<String, String>) {
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key.expose_secret()),
        );
    }
}

impl std::fmt::Debug for BearerKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerKeyAuth")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Header-key authentication (Gemini's `x-goog-api-key`).
pub struct HeaderKeyAuth {
    header_name: &'static str,
    api_key: SecretString,
}

impl HeaderKeyAuth {
    /// Creates a provider that sends the key in the given header.
    pub fn new(header_name: &'static str, api_key: SecretString) -> Self {
        Self {
            header_name,
            api_key,
        }
    }
}

impl AuthProvider for HeaderKeyAuth {
    fn apply_auth(&self, headers: &mut HashMap<String, String>) {
        headers.insert(
            self.header_name.to_string(),
            self.api_key.expose_secret().to_string(),
        );
    }
}

impl std::fmt::Debug for HeaderKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderKeyAuth")
            .field("header_name", &self.header_name)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
