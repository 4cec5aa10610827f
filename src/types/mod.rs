//! Core dialogue types: roles, turns, and stream fragments.

use serde::{Deserialize, Serialize};

/// The author of a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The static system instruction, at most one, always first.
    System,
    /// The human side of the dialogue.
    User,
    /// The model side of the dialogue.
    Assistant,
}

/// One role-tagged message in a conversation. Immutable once appended;
/// ordering within the session is its timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    /// The author of this turn.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// True when a streamed exchange failed mid-flight and this turn holds
    /// only the fragments emitted before the failure.
    #[serde(default)]
    pub truncated: bool,
}

impl Turn {
    /// Creates a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            truncated: false,
        }
    }

    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            truncated: false,
        }
    }

    /// Creates an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            truncated: false,
        }
    }

    /// Creates a partial assistant turn from a failed streamed exchange.
    pub fn assistant_truncated(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            truncated: true,
        }
    }
}

/// One incremental piece of a generated response.
///
/// Fragments are append-only: the text is never revised after emission, and
/// concatenating fragment text in arrival order yields exactly the final
/// assistant turn content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    /// The fragment text. Never empty.
    pub text: String,
    /// Terminal marker: true on the last fragment of the exchange.
    pub is_last: bool,
}

impl StreamFragment {
    /// Creates a non-terminal fragment. Returns `None` for empty text since
    /// fragments must carry content.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            None
        } else {
            Some(Self {
                text,
                is_last: false,
            })
        }
    }

    /// Marks this fragment as the terminal one.
    pub fn terminal(mut self) -> Self {
        self.is_last = true;
        self
    }
}
