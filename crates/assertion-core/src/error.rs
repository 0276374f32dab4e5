//! Error types for assertion decoding, signing and verification

use thiserror::Error;

/// Result type alias using AssertionError
pub type Result<T> = std::result::Result<T, AssertionError>;

/// Errors raised while decoding the text encoding of an assertion
///
/// Every variant names the offending header (or segment) so that callers can
/// report actionable diagnostics instead of a generic failure string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Input is not valid UTF-8 where text is required
    #[error("header block is not valid UTF-8")]
    InvalidUtf8,

    /// No `type` header as the first header line
    #[error("assertion must start with a 'type' header")]
    MissingType,

    /// The `type` header names a type outside the registry
    #[error("unknown assertion type: {0}")]
    UnknownType(String),

    /// A mandatory header is absent
    #[error("{assertion_type} assertion is missing mandatory header '{header}'")]
    MissingHeader {
        assertion_type: String,
        header: String,
    },

    /// A header line does not follow the `name: value` grammar
    #[error("malformed header line {line}: {reason}")]
    MalformedHeader { line: usize, reason: String },

    /// A header value failed to parse as its declared kind
    #[error("header '{header}' has a malformed value: {reason}")]
    MalformedValue { header: String, reason: String },

    /// Headers after `type` are not in ascending order
    #[error("header '{header}' is out of canonical order")]
    NonCanonicalOrder { header: String },

    /// Same header appears twice
    #[error("duplicate header '{0}'")]
    DuplicateHeader(String),

    /// Declared body length does not match the bytes present
    #[error("body length mismatch: declared {declared}, available {available}")]
    BodyLengthMismatch { declared: usize, available: usize },

    /// Body present on a type that forbids one
    #[error("{0} assertion must not have a body")]
    UnexpectedBody(String),

    /// Body absent on a type that requires one
    #[error("{0} assertion requires a body")]
    MissingBody(String),

    /// No signature block after the content
    #[error("assertion has no signature block")]
    MissingSignature,

    /// Signature block holds bytes outside the base64 alphabet
    #[error("malformed signature block: {0}")]
    MalformedSignature(String),
}

/// Errors that can occur while building, signing or verifying assertions
#[derive(Error, Debug)]
pub enum AssertionError {
    /// Malformed encoding
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Signature does not verify against the expected key
    #[error("signature verification failed for key {key_id}: {reason}")]
    InvalidSignature { key_id: String, reason: String },

    /// A public key could not be decoded
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    /// Header supplied to a builder that callers may not set
    #[error("header '{0}' is managed by the signer and cannot be set")]
    ReservedHeader(String),

    /// Self-signed assertion does not bind its own key correctly
    #[error("self-signature mismatch: {0}")]
    SelfSignatureMismatch(String),
}

impl From<ed25519_dalek::SignatureError> for AssertionError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        AssertionError::InvalidKey(err.to_string())
    }
}

impl From<base64::DecodeError> for AssertionError {
    fn from(err: base64::DecodeError) -> Self {
        AssertionError::InvalidKey(format!("invalid base64: {}", err))
    }
}
