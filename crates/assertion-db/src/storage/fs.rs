//! Filesystem storage backend
//!
//! Layout: `<root>/<type>/<component>.<component>...`, where each primary-key
//! component is unpadded URL-safe base64 (so names never contain `.` or `/`).
//! Each file holds one assertion in its text encoding. Writes go to a hidden
//! temporary file first and are renamed over the record, so readers see
//! either the old or the new revision.

use assertion_core::{Assertion, AssertionType};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{AssertionStore, StorageError};

/// Durable, file-per-record assertion store
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "Opened filesystem assertion store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn type_dir(&self, assertion_type: AssertionType) -> PathBuf {
        self.root.join(assertion_type.name())
    }

    fn record_name(primary_key: &[String]) -> String {
        primary_key
            .iter()
            .map(|component| URL_SAFE_NO_PAD.encode(component.as_bytes()))
            .collect::<Vec<_>>()
            .join(".")
    }

    async fn read_record(&self, path: &Path) -> Result<Option<Assertion>, StorageError> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Assertion::decode(&data)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                record: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl AssertionStore for FsStore {
    async fn get(
        &self,
        assertion_type: AssertionType,
        primary_key: &[String],
    ) -> Result<Option<Assertion>, StorageError> {
        if primary_key.is_empty() {
            return Ok(None);
        }
        let path = self
            .type_dir(assertion_type)
            .join(Self::record_name(primary_key));
        let record = self.read_record(&path).await?;

        match record {
            Some(assertion)
                if assertion.assertion_type() != assertion_type
                    || assertion.primary_key() != primary_key =>
            {
                Err(StorageError::Corrupt {
                    record: path.display().to_string(),
                    reason: format!("file holds {}", assertion.reference()),
                })
            }
            other => Ok(other),
        }
    }

    async fn put(&self, assertion: &Assertion) -> Result<(), StorageError> {
        if !assertion.descriptor().is_storable() {
            return Err(StorageError::Unstorable(assertion.assertion_type()));
        }

        let dir = self.type_dir(assertion.assertion_type());
        tokio::fs::create_dir_all(&dir).await?;

        let name = Self::record_name(&assertion.primary_key());
        let path = dir.join(&name);
        let tmp = dir.join(format!(".{}.tmp", name));

        tokio::fs::write(&tmp, assertion.encode()).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(
            reference = %assertion.reference(),
            path = %path.display(),
            "Wrote assertion record"
        );
        Ok(())
    }

    async fn list(&self, assertion_type: AssertionType) -> Result<Vec<Assertion>, StorageError> {
        let dir = self.type_dir(assertion_type);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut assertions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if let Some(assertion) = self.read_record(&entry.path()).await? {
                assertions.push(assertion);
            }
        }
        Ok(assertions)
    }
}
