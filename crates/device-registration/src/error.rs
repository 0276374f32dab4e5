//! Error types for device registration

use assertion_core::{AssertionError, ParseError};
use assertion_db::TrustError;
use thiserror::Error;

/// Result type for registration operations
pub type Result<T> = std::result::Result<T, RegistrationError>;

/// Errors that can end (or interrupt) a registration
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The device service refused the registration; the message is its own wording
    #[error("{0}")]
    Terminal(String),

    /// Retries exhausted while the device service kept answering "pending"
    #[error("device service still pending after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Cancelled or past the caller's deadline while waiting to retry
    #[error("registration cancelled")]
    Cancelled,

    /// Issued serial does not match what was requested
    #[error("serial does not match the request: {0}")]
    ConsistencyViolation(String),

    /// Issued serial failed verification or could not be stored
    #[error("serial rejected by the trust database: {0}")]
    Trust(#[from] TrustError),

    /// Malformed assertion or key
    #[error("invalid assertion: {0}")]
    Assertion(#[from] AssertionError),

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Status code outside the protocol
    #[error("unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    /// Response body that does not follow the protocol
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid client configuration or inputs
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ParseError> for RegistrationError {
    fn from(err: ParseError) -> Self {
        RegistrationError::Assertion(AssertionError::Parse(err))
    }
}

impl From<reqwest::Error> for RegistrationError {
    fn from(err: reqwest::Error) -> Self {
        RegistrationError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for RegistrationError {
    fn from(err: serde_json::Error) -> Self {
        RegistrationError::InvalidResponse(err.to_string())
    }
}
