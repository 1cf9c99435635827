//! Error taxonomy shared by every pipeline stage.
//!
//! Library code returns [`Result`]; the `docchat` binary wraps these in
//! `anyhow` at the command boundary and exits non-zero.

use thiserror::Error;

use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid setting. Raised before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// A remote service answered with a non-success status.
    #[error("{service} returned {status}: {body}")]
    Service {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service answered 2xx but the payload was not what we expect.
    #[error("unexpected response from {service}: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("failed to read {path}: {source}")]
    Extract {
        path: String,
        #[source]
        source: ExtractError,
    },

    #[error("embedding for {context} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn invalid_response(service: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    /// True for HTTP 404 from a remote service.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Service { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
