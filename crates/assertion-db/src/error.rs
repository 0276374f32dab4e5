//! Error types for the trust database and chain verifier

use crate::storage::StorageError;
use assertion_core::{AssertionError, AssertionType, Reference};
use thiserror::Error;

/// Result type alias using TrustError
pub type Result<T> = std::result::Result<T, TrustError>;

/// Errors raised while verifying, adding or looking up assertions
///
/// Every variant that concerns a specific assertion carries its
/// [`Reference`] (type plus primary key).
#[derive(Error, Debug)]
pub enum TrustError {
    /// Assertion-level failure (decoding, key parsing)
    #[error(transparent)]
    Assertion(#[from] AssertionError),

    /// Signature does not verify against the key named by `sign-key-sha3-384`
    #[error("invalid signature on {reference}: {reason}")]
    InvalidSignature { reference: Reference, reason: String },

    /// A link of the chain of trust is absent from the database
    #[error("{reference} requires {missing}, which is not in the database")]
    MissingPrerequisite {
        reference: Reference,
        missing: Reference,
    },

    /// Cycle, expired key or a chain that never reaches a trusted root
    #[error("broken chain of trust at {reference}: {reason}")]
    BrokenChain { reference: Reference, reason: String },

    /// Type-specific consistency rule failed
    #[error("consistency violation on {reference}: {reason}")]
    ConsistencyViolation { reference: Reference, reason: String },

    /// Stale add: the stored revision is at least as new
    #[error("revision conflict on {reference}: stored revision {current}, attempted {attempted}")]
    RevisionConflict {
        reference: Reference,
        current: u64,
        attempted: u64,
    },

    /// Lookup miss
    #[error("assertion not found: {0}")]
    NotFound(Reference),

    /// A partial primary key matched more than one assertion
    #[error("{reference} matches {matches} assertions")]
    Ambiguous { reference: Reference, matches: usize },

    /// Type has no primary key and cannot be stored
    #[error("{0} assertions cannot be stored")]
    Unstorable(AssertionType),

    /// Invalid trusted-root configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TrustError {
    /// Reference of the assertion the error is about, when there is one
    pub fn reference(&self) -> Option<&Reference> {
        match self {
            TrustError::InvalidSignature { reference, .. }
            | TrustError::MissingPrerequisite { reference, .. }
            | TrustError::BrokenChain { reference, .. }
            | TrustError::ConsistencyViolation { reference, .. }
            | TrustError::RevisionConflict { reference, .. }
            | TrustError::Ambiguous { reference, .. } => Some(reference),
            TrustError::NotFound(reference) => Some(reference),
            _ => None,
        }
    }
}
