use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorType {
    InvalidRequestError,
    RateLimitError,
    AuthenticationError,
    ServerError,
    #[serde(other)]
    Unknown,
}

/// Payload of a realtime `error` event.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerError {
    #[serde(rename = "type")]
    pub error_type: ApiErrorType,
    pub code: Option<String>,
    pub message: String,
    pub param: Option<String>,
    pub event_id: Option<String>,
}

/// JSON error body of the backend endpoints, `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Network or connectivity failure talking to an upstream.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The remote API answered but reported a failure status.
    #[error("{service} error: {message}")]
    Upstream { service: &'static str, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Header error: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("The connection was closed unexpectedly")]
    ConnectionClosed,
}

impl Error {
    /// Connectivity failures, as opposed to upstream-reported ones.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::WebSocket(_) | Self::Io(_))
    }

    /// Transport failure with the request URL dropped. Used for requests
    /// that carry an API key in the query string.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        Self::Transport(err.without_url())
    }

    pub(crate) fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream { service, message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
