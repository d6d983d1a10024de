//! Error types for dumpscope

use thiserror::Error;

/// Result type alias using dumpscope's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dumpscope
///
/// Only configuration and transport errors are expected to reach the caller
/// of the agent loop. Tool contract errors are absorbed into the evidence
/// ledger, cache read failures degrade to a miss, and trace write failures
/// are swallowed at the call site.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing API key, missing base URL, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider API error with a redacted, byte-capped body
    #[error("Provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    /// Rate limit exceeded on the provider side
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Authentication failure against the provider
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The provider returned a body we could not interpret
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Connection failure to the remote debugger service
    #[error("Connection error: {0}")]
    Connection(String),

    /// The run was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// True when this error should abort the whole agent run rather than a
    /// single iteration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Unauthorized(_) | Error::Cancelled)
    }
}
