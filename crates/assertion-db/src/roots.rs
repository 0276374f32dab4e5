//! Trusted roots
//!
//! The statically configured, self-certifying keys at the top of every chain
//! of trust. Built once at start-up and shared read-only (`Arc<TrustedRoots>`)
//! with the verifier and the database.

use crate::error::{Result, TrustError};
use assertion_core::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// A trusted root key and the account it speaks for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrustedRoot {
    pub account_id: String,
    pub public_key: PublicKey,
}

impl TrustedRoot {
    pub fn new(account_id: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            account_id: account_id.into(),
            public_key,
        }
    }
}

/// Immutable set of trusted roots, indexed by key ID
#[derive(Debug, Clone, Default)]
pub struct TrustedRoots {
    by_key_id: HashMap<String, TrustedRoot>,
    accounts: HashSet<String>,
}

impl TrustedRoots {
    pub fn new(roots: impl IntoIterator<Item = TrustedRoot>) -> Self {
        let mut by_key_id = HashMap::new();
        let mut accounts = HashSet::new();
        for root in roots {
            accounts.insert(root.account_id.clone());
            by_key_id.insert(root.public_key.key_id().to_string(), root);
        }
        Self {
            by_key_id,
            accounts,
        }
    }

    /// Parse a JSON array of `{"account-id": ..., "public-key": ...}`
    pub fn from_json(json: &str) -> Result<Self> {
        let roots: Vec<TrustedRoot> = serde_json::from_str(json)
            .map_err(|e| TrustError::Config(format!("invalid trusted roots: {}", e)))?;
        if roots.is_empty() {
            return Err(TrustError::Config("no trusted roots configured".into()));
        }
        Ok(Self::new(roots))
    }

    /// Load trusted roots from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| TrustError::Config(format!("{}: {}", path.display(), e)))?;
        let roots = Self::from_json(&json)?;
        info!(path = %path.display(), count = roots.len(), "Loaded trusted roots");
        Ok(roots)
    }

    /// Root for a key ID, if the key is trusted
    pub fn get(&self, key_id: &str) -> Option<&TrustedRoot> {
        self.by_key_id.get(key_id)
    }

    /// Whether the account is vouched for by a root key
    pub fn is_root_account(&self, account_id: &str) -> bool {
        self.accounts.contains(account_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustedRoot> {
        self.by_key_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_key_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key_id.is_empty()
    }
}
