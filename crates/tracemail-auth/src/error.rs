//! Error types for the auth module

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur while obtaining or renewing access tokens
#[derive(Debug, Error)]
pub enum AuthError {
    /// Required configuration key is missing from the environment
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    /// Configuration value is present but unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The token request failed before a response arrived
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint answered with a non-success status
    #[error("Token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    /// The token endpoint response could not be decoded
    #[error("Failed to parse token response: {0}")]
    Parse(String),
}
