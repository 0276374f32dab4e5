//! # Assertion DB
//!
//! Trust database for signed assertions.
//!
//! - **TrustedRoots**: the statically configured root keys, immutable after start-up
//! - **ChainVerifier**: walks `sign-key -> account-key -> account` up to a root
//! - **TrustDatabase**: verified, revision-ordered storage with `add`, `find`,
//!   `find_sequence` and `find_all`
//! - **AssertionStore**: storage backends (memory, filesystem, PostgreSQL)
//!
//! ## Guarantees
//!
//! 1. Only assertions whose chain of trust verifies are ever stored
//! 2. At most one assertion per `(type, primary key)`: the highest revision
//! 3. A stale add (revision not above the stored one) fails with `RevisionConflict`

pub mod consistency;
pub mod database;
pub mod error;
pub mod roots;
pub mod storage;
pub mod verify;

pub use database::TrustDatabase;
pub use error::{Result, TrustError};
pub use roots::{TrustedRoot, TrustedRoots};
pub use storage::{AssertionStore, FsStore, MemoryStore, StorageError};
pub use verify::{ChainLink, ChainVerifier, VerifiedChain, MAX_CHAIN_DEPTH};

#[cfg(feature = "postgres")]
pub use storage::PostgresStore;
