//! Error types for quizmate-ai

use thiserror::Error;

/// Result type alias using quizmate-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to an LLM provider
#[derive(Error, Debug)]
pub enum Error {
    /// No credential has been configured yet
    #[error("AI service is not configured: add an API key in the AI settings first")]
    NotConfigured,

    /// Stored configuration is incomplete; lists every problem found
    #[error("AI configuration is incomplete: {0}")]
    InvalidConfig(String),

    /// Provider answered with a non-2xx status, or the body could not be read
    #[error("API call failed{}: {body}", status_suffix(.status))]
    Api { status: Option<u16>, body: String },

    /// Network or connection failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be written to storage
    #[error("Failed to save AI configuration: {0}")]
    Persistence(String),

    /// Provider name not recognized
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Stream was cancelled
    #[error("Request aborted")]
    Aborted,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl Error {
    /// Create an API error from a status code and raw body text
    pub fn api(status: impl Into<Option<u16>>, body: impl Into<String>) -> Self {
        Self::Api {
            status: status.into(),
            body: body.into(),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the caller should send the user to the configuration screen
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Error::NotConfigured)
    }
}
