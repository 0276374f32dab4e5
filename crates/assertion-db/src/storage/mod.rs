//! Storage abstraction for the trust database
//!
//! Backends keep exactly one record per `(type, primary key)`: the latest
//! revision handed to `put`. Revision ordering, signature checks and locking
//! are the database's job; a store is a plain keyed record set.
//!
//! - `MemoryStore`: default, process lifetime only
//! - `FsStore`: one file per record in the assertion text encoding
//! - `PostgresStore`: shared, durable state (feature `postgres`)

pub mod fs;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use fs::FsStore;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use assertion_core::{Assertion, AssertionType};
use async_trait::async_trait;
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record {record}: {reason}")]
    Corrupt { record: String, reason: String },

    #[error("{0} assertions have no primary key and cannot be stored")]
    Unstorable(AssertionType),

    #[error("database error: {0}")]
    Database(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Storage backend trait for assertions
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait AssertionStore: Send + Sync + Debug {
    /// Get the stored assertion for an exact primary key
    async fn get(
        &self,
        assertion_type: AssertionType,
        primary_key: &[String],
    ) -> Result<Option<Assertion>, StorageError>;

    /// Insert or replace the record for the assertion's primary key
    async fn put(&self, assertion: &Assertion) -> Result<(), StorageError>;

    /// All stored assertions of a type, in no particular order
    async fn list(&self, assertion_type: AssertionType) -> Result<Vec<Assertion>, StorageError>;
}
