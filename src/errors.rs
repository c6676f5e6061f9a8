// src/errors.rs

use thiserror::Error;

pub type ParleyResult<T> = Result<T, ParleyError>;

/// All failure modes surfaced by the client.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Transport-level failure: the server was unreachable or the
    /// connection broke before a response arrived.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status. `message` carries the
    /// server-provided error text when the body was parseable JSON,
    /// otherwise a generic status-code message.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The server declared an error mid-stream, or the stream body could
    /// not be consumed.
    #[error("stream error: {0}")]
    Stream(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParleyError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        ParleyError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn stream_error(message: impl Into<String>) -> Self {
        ParleyError::Stream(message.into())
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        ParleyError::Config(message.into())
    }
}
