use thiserror::Error;

/// Message used when a failure carries no description of its own.
pub const FALLBACK_MESSAGE: &str = "Something went wrong";

/// Terminal failure of a single lookup attempt.
///
/// The `Display` output is exactly what the user sees in the error region.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("City not found")]
    NotFound,

    #[error("API error: {0}")]
    Api(u16),

    /// Network failure, malformed body, or anything else that went wrong.
    #[error("{0}")]
    Transport(String),
}

impl LookupError {
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            LookupError::Transport(FALLBACK_MESSAGE.to_string())
        } else {
            LookupError::Transport(message)
        }
    }

    /// Maps a non-success HTTP status code.
    pub fn from_status(status: u16) -> Self {
        if status == 404 { LookupError::NotFound } else { LookupError::Api(status) }
    }
}

impl From<reqwest::Error> for LookupError {
    /// Drops the request URL from the message: it carries the API key.
    fn from(err: reqwest::Error) -> Self {
        LookupError::transport(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for LookupError {
    fn from(err: serde_json::Error) -> Self {
        LookupError::transport(err.to_string())
    }
}
