//! In-memory storage backend
//!
//! Default storage implementation using an in-memory hashmap.
//! Suitable for tests and short-lived processes. Data is lost on restart.

use assertion_core::{Assertion, AssertionType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use super::{AssertionStore, StorageError};

type RecordKey = (AssertionType, Vec<String>);

/// In-memory assertion store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, Assertion>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssertionStore for MemoryStore {
    async fn get(
        &self,
        assertion_type: AssertionType,
        primary_key: &[String],
    ) -> Result<Option<Assertion>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::Poisoned)?;
        Ok(records
            .get(&(assertion_type, primary_key.to_vec()))
            .cloned())
    }

    async fn put(&self, assertion: &Assertion) -> Result<(), StorageError> {
        if !assertion.descriptor().is_storable() {
            return Err(StorageError::Unstorable(assertion.assertion_type()));
        }
        let key = (assertion.assertion_type(), assertion.primary_key());
        let mut records = self.records.write().map_err(|_| StorageError::Poisoned)?;
        debug!(reference = %assertion.reference(), "Storing assertion in memory");
        records.insert(key, assertion.clone());
        Ok(())
    }

    async fn list(&self, assertion_type: AssertionType) -> Result<Vec<Assertion>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::Poisoned)?;
        Ok(records
            .iter()
            .filter(|((t, _), _)| *t == assertion_type)
            .map(|(_, a)| a.clone())
            .collect())
    }
}
