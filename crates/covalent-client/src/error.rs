//! Error types for the Covalent client

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the Covalent client
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the API
    #[error("unexpected HTTP status: {0}")]
    HttpStatus(StatusCode),

    /// The API reported an error inside a well-formed envelope
    #[error("upstream error (code {code:?}): {message}")]
    Upstream {
        code: Option<i64>,
        message: String,
    },

    /// The response body is not the expected envelope shape
    #[error("malformed response envelope: {0}")]
    MalformedEnvelope(String),

    /// Invalid base URL or request path
    #[error("invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transient failures persisted past the retry budget
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<Error>,
    },
}

impl Error {
    /// Transient errors are retried with backoff; everything else surfaces
    /// immediately to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::HttpStatus(_) | Error::Upstream { .. }
        )
    }
}

/// Result type alias for the Covalent client
pub type Result<T> = std::result::Result<T, Error>;
