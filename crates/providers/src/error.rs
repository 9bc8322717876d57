use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Missing or rejected credentials (HTTP 401/403, or no key configured).
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Non-success response from the API.
    #[error("model API error HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The response parsed but did not carry the expected fields.
    #[error("malformed model response: {detail}")]
    MalformedResponse { detail: String },
}

impl Error {
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            detail: detail.into(),
        }
    }
}

/// Name the capability's error category the way the rest of the workspace
/// does.
pub type ProviderError = Error;
pub type Result<T> = std::result::Result<T, Error>;
