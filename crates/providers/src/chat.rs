//! Chat message model for completion requests.

use serde::{Deserialize, Serialize};

/// One message in a chat-completions conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::System { content } | Self::User { content } | Self::Assistant { content } => {
                content
            },
        }
    }

    /// Wire shape for an OpenAI-compatible chat/completions request.
    #[must_use]
    pub fn to_request_value(&self) -> serde_json::Value {
        match self {
            Self::System { content } => serde_json::json!({
                "role": "system",
                "content": content,
            }),
            Self::User { content } => serde_json::json!({
                "role": "user",
                "content": content,
            }),
            Self::Assistant { content } => serde_json::json!({
                "role": "assistant",
                "content": content,
            }),
        }
    }
}
