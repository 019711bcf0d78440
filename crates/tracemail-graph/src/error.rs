//! Error types for the Graph mail client
//!
//! Logical not-found is not an error here: lookups return `Ok(None)` or an
//! empty list so callers can tell "nothing matched" apart from "the call
//! failed".

use thiserror::Error;

/// Result type for Graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur while talking to the Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Request failed before a response arrived
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an unexpected status
    #[error("Graph API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// No access token is currently held by the keeper
    #[error("No access token available")]
    NoToken,

    /// A request URL could not be assembled
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
