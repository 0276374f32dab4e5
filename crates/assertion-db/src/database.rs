//! The trust database
//!
//! Single-writer, many-readers: `add` holds the write gate across chain
//! verification, the revision check, the consistency checks and the final
//! `put`, so readers observe either the state before or after an add, never
//! a partially validated assertion. A failed add leaves the store untouched.

use crate::consistency::check_consistency;
use crate::error::{Result, TrustError};
use crate::roots::TrustedRoots;
use crate::storage::{AssertionStore, MemoryStore};
use crate::verify::{ChainVerifier, VerifiedChain};
use assertion_core::{Assertion, AssertionType, Reference};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Verified, revision-ordered assertion storage
#[derive(Debug)]
pub struct TrustDatabase {
    verifier: ChainVerifier,
    store: Arc<dyn AssertionStore>,
    gate: RwLock<()>,
}

impl TrustDatabase {
    /// Create a database over the given store, trusting `roots`
    pub fn new(roots: Arc<TrustedRoots>, store: Arc<dyn AssertionStore>) -> Self {
        info!(roots = roots.len(), store = ?store, "Trust database initialized");
        Self {
            verifier: ChainVerifier::new(roots),
            store,
            gate: RwLock::new(()),
        }
    }

    /// Create a database backed by a fresh `MemoryStore`
    pub fn in_memory(roots: Arc<TrustedRoots>) -> Self {
        Self::new(roots, Arc::new(MemoryStore::new()))
    }

    pub fn roots(&self) -> &TrustedRoots {
        self.verifier.roots()
    }

    pub fn verifier(&self) -> &ChainVerifier {
        &self.verifier
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Verify and store an assertion
    ///
    /// Fails with `InvalidSignature`, `MissingPrerequisite`, `BrokenChain`,
    /// `RevisionConflict` or `ConsistencyViolation` without changing state.
    pub async fn add(&self, assertion: Assertion) -> Result<VerifiedChain> {
        self.add_at(assertion, Utc::now()).await
    }

    /// `add`, judging key validity windows at `now`
    pub async fn add_at(&self, assertion: Assertion, now: DateTime<Utc>) -> Result<VerifiedChain> {
        let _guard = self.gate.write().await;

        let chain = match self.validate(&assertion, now).await {
            Ok(chain) => chain,
            Err(e) => {
                warn!(reference = %assertion.reference(), error = %e, "Rejected assertion");
                return Err(e);
            }
        };

        self.store.put(&assertion).await?;
        info!(
            reference = %assertion.reference(),
            revision = assertion.revision(),
            authority = %assertion.authority_id(),
            "Added assertion"
        );
        Ok(chain)
    }

    /// Run every `add` step except storing the assertion
    pub async fn check(&self, assertion: &Assertion) -> Result<VerifiedChain> {
        let _guard = self.gate.read().await;
        self.validate(assertion, Utc::now()).await
    }

    async fn validate(&self, assertion: &Assertion, now: DateTime<Utc>) -> Result<VerifiedChain> {
        if !assertion.descriptor().is_storable() {
            return Err(TrustError::Unstorable(assertion.assertion_type()));
        }

        let chain = self
            .verifier
            .verify_at(assertion, self.store.as_ref(), now)
            .await?;

        let reference = assertion.reference();
        if let Some(current) = self
            .store
            .get(reference.assertion_type, &reference.primary_key)
            .await?
        {
            if assertion.revision() <= current.revision() {
                return Err(TrustError::RevisionConflict {
                    reference,
                    current: current.revision(),
                    attempted: assertion.revision(),
                });
            }
        }

        check_consistency(assertion, self.store.as_ref(), self.roots()).await?;
        Ok(chain)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Verify an assertion's chain of trust against the current contents
    pub async fn verify(&self, assertion: &Assertion) -> Result<VerifiedChain> {
        let _guard = self.gate.read().await;
        self.verifier.verify(assertion, self.store.as_ref()).await
    }

    /// Look up by primary key
    ///
    /// A full primary key is an exact lookup. A shorter key is a prefix match
    /// and must identify exactly one assertion.
    pub async fn find<S: AsRef<str>>(
        &self,
        assertion_type: AssertionType,
        primary_key: &[S],
    ) -> Result<Assertion> {
        let _guard = self.gate.read().await;
        let key: Vec<String> = primary_key.iter().map(|s| s.as_ref().to_string()).collect();
        let reference = Reference::new(assertion_type, key);
        let full_len = assertion_type.descriptor().primary_key.len();

        if reference.primary_key.len() == full_len {
            return self
                .store
                .get(assertion_type, &reference.primary_key)
                .await?
                .ok_or(TrustError::NotFound(reference));
        }
        if reference.primary_key.len() > full_len {
            return Err(TrustError::NotFound(reference));
        }

        let mut matches: Vec<Assertion> = self
            .store
            .list(assertion_type)
            .await?
            .into_iter()
            .filter(|a| a.primary_key().starts_with(&reference.primary_key))
            .collect();

        match matches.len() {
            0 => Err(TrustError::NotFound(reference)),
            1 => Ok(matches.remove(0)),
            n => Err(TrustError::Ambiguous {
                reference,
                matches: n,
            }),
        }
    }

    /// Next entry of a sequence-forming type
    ///
    /// Returns the lowest sequence number strictly greater than `after` for
    /// the subject, or the latest one when `after` is `None`.
    pub async fn find_sequence<S: AsRef<str>>(
        &self,
        assertion_type: AssertionType,
        subject: &[S],
        after: Option<u64>,
    ) -> Result<Assertion> {
        let _guard = self.gate.read().await;
        let subject: Vec<String> = subject.iter().map(|s| s.as_ref().to_string()).collect();
        let reference = Reference::new(assertion_type, subject);

        if !assertion_type.descriptor().is_sequence_forming() {
            return Err(TrustError::NotFound(reference));
        }

        let candidates = self
            .store
            .list(assertion_type)
            .await?
            .into_iter()
            .filter(|a| a.subject_key() == reference.primary_key)
            .filter_map(|a| a.sequence().map(|seq| (seq, a)));

        let found = match after {
            Some(after) => candidates
                .filter(|(seq, _)| *seq > after)
                .min_by_key(|(seq, _)| *seq),
            None => candidates.max_by_key(|(seq, _)| *seq),
        };

        found.map(|(_, a)| a).ok_or(TrustError::NotFound(reference))
    }

    /// All assertions of a type whose scalar headers equal the given values
    pub async fn find_all(
        &self,
        assertion_type: AssertionType,
        filters: &[(&str, &str)],
    ) -> Result<Vec<Assertion>> {
        let _guard = self.gate.read().await;
        let mut found: Vec<Assertion> = self
            .store
            .list(assertion_type)
            .await?
            .into_iter()
            .filter(|a| {
                filters.iter().all(|(name, value)| {
                    a.header(name)
                        .and_then(|v| v.to_scalar())
                        .is_some_and(|v| v == *value)
                })
            })
            .collect();
        found.sort_by_key(|a| a.primary_key());
        Ok(found)
    }
}
