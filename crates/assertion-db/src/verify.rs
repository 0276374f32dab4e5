//! Chain-of-trust verification
//!
//! Walks from a candidate assertion towards the trusted roots:
//!
//! ```text
//! assertion --sign-key--> account-key --account-id--> account --sign-key--> ...
//!                               \--sign-key--> ...                        root key
//! ```
//!
//! Every hop is an explicit lookup by identifier in the store; nothing is
//! cached between calls, so a superseding account-key revision (for example
//! one that ends the key's validity window) takes effect on the next
//! verification. This holds for trusted root keys too: a stored account-key
//! for a root key bounds when that root may sign.

use crate::error::{Result, TrustError};
use crate::roots::TrustedRoots;
use crate::storage::AssertionStore;
use assertion_core::{
    Assertion, AssertionError, AssertionType, PublicKey, Reference, SignerRule,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest ancestry path walked before giving up
pub const MAX_CHAIN_DEPTH: usize = 16;

/// One verified hop: an assertion and the key that signed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub reference: Reference,
    pub signer_key_id: String,
}

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedChain {
    /// Hops in the order they were verified, candidate first
    pub links: Vec<ChainLink>,
    /// Trusted root keys the chain terminated at
    pub root_key_ids: Vec<String>,
}

impl VerifiedChain {
    /// Whether the chain terminates at a trusted root (false for self-signed requests)
    pub fn is_rooted(&self) -> bool {
        !self.root_key_ids.is_empty()
    }
}

/// Verifies signatures from an assertion up to the trusted roots
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    roots: Arc<TrustedRoots>,
}

impl ChainVerifier {
    pub fn new(roots: Arc<TrustedRoots>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &TrustedRoots {
        &self.roots
    }

    /// Verify the chain of trust of `assertion` as of now
    pub async fn verify(
        &self,
        assertion: &Assertion,
        store: &dyn AssertionStore,
    ) -> Result<VerifiedChain> {
        self.verify_at(assertion, store, Utc::now()).await
    }

    /// Verify the chain of trust of `assertion`, judging key validity at `now`
    pub async fn verify_at(
        &self,
        assertion: &Assertion,
        store: &dyn AssertionStore,
        now: DateTime<Utc>,
    ) -> Result<VerifiedChain> {
        let mut pending: Vec<(Assertion, Vec<Reference>)> = vec![(assertion.clone(), Vec::new())];
        let mut verified: HashSet<Reference> = HashSet::new();
        let mut chain = VerifiedChain {
            links: Vec::new(),
            root_key_ids: Vec::new(),
        };

        while let Some((current, mut path)) = pending.pop() {
            let reference = current.reference();

            if path.contains(&reference) {
                return Err(self.broken(reference, "signature chain loops back on itself"));
            }
            if verified.contains(&reference) {
                continue;
            }
            if path.len() >= MAX_CHAIN_DEPTH {
                return Err(self.broken(
                    reference,
                    &format!("chain is deeper than {} links", MAX_CHAIN_DEPTH),
                ));
            }
            path.push(reference.clone());

            if let SignerRule::SelfSigned(_) = current.descriptor().signer {
                let key = current
                    .verify_self_signed()
                    .map_err(|e| invalid_signature(&reference, e))?;
                chain.links.push(ChainLink {
                    reference: reference.clone(),
                    signer_key_id: key.key_id().to_string(),
                });
                verified.insert(reference);
                continue;
            }

            let key_id = current.sign_key_id().to_string();

            if let Some(root) = self.roots.get(&key_id) {
                // A stored account-key for a root key can end its validity
                if let Some(root_key) = store
                    .get(AssertionType::AccountKey, std::slice::from_ref(&key_id))
                    .await?
                {
                    let owner = root_key.header_str("account-id").unwrap_or_default();
                    if owner != root.account_id {
                        return Err(self.broken(
                            reference,
                            &format!(
                                "root key {} is registered to account {}, not {}",
                                key_id, owner, root.account_id
                            ),
                        ));
                    }
                    check_key_window(&root_key, now)
                        .map_err(|reason| self.broken(reference.clone(), &reason))?;
                }

                current
                    .verify_signature(&root.public_key)
                    .map_err(|e| invalid_signature(&reference, e))?;
                if current.authority_id() != root.account_id {
                    return Err(TrustError::ConsistencyViolation {
                        reason: format!(
                            "signed by the root key of {}, but authority-id is {}",
                            root.account_id,
                            current.authority_id()
                        ),
                        reference,
                    });
                }
                debug!(reference = %reference, key_id = %key_id, "Reached trusted root");
                chain.links.push(ChainLink {
                    reference: reference.clone(),
                    signer_key_id: key_id.clone(),
                });
                if !chain.root_key_ids.contains(&key_id) {
                    chain.root_key_ids.push(key_id);
                }
                verified.insert(reference);
                continue;
            }

            let key_ref = Reference::new(AssertionType::AccountKey, vec![key_id.clone()]);
            let account_key = store
                .get(AssertionType::AccountKey, &key_ref.primary_key)
                .await?
                .ok_or_else(|| TrustError::MissingPrerequisite {
                    reference: reference.clone(),
                    missing: key_ref.clone(),
                })?;

            let owner = account_key.header_str("account-id").unwrap_or_default();
            if owner != current.authority_id() {
                return Err(TrustError::ConsistencyViolation {
                    reason: format!(
                        "signed by a key of account {}, but authority-id is {}",
                        owner,
                        current.authority_id()
                    ),
                    reference,
                });
            }

            check_key_window(&account_key, now).map_err(|reason| self.broken(reference.clone(), &reason))?;

            let public_key = account_key_public_key(&account_key)?;
            current
                .verify_signature(&public_key)
                .map_err(|e| invalid_signature(&reference, e))?;

            chain.links.push(ChainLink {
                reference: reference.clone(),
                signer_key_id: key_id,
            });
            verified.insert(reference.clone());

            let authority = current.authority_id().to_string();
            if !self.roots.is_root_account(&authority) {
                let account_ref = Reference::new(AssertionType::Account, vec![authority]);
                let account = store
                    .get(AssertionType::Account, &account_ref.primary_key)
                    .await?
                    .ok_or_else(|| TrustError::MissingPrerequisite {
                        reference: reference.clone(),
                        missing: account_ref,
                    })?;
                pending.push((account, path.clone()));
            }
            pending.push((account_key, path));
        }

        Ok(chain)
    }

    fn broken(&self, reference: Reference, reason: &str) -> TrustError {
        warn!(reference = %reference, reason = %reason, "Broken chain of trust");
        TrustError::BrokenChain {
            reference,
            reason: reason.to_string(),
        }
    }
}

fn invalid_signature(reference: &Reference, err: AssertionError) -> TrustError {
    warn!(reference = %reference, error = %err, "Signature verification failed");
    TrustError::InvalidSignature {
        reference: reference.clone(),
        reason: err.to_string(),
    }
}

/// Decode the public key carried in an account-key body
pub(crate) fn account_key_public_key(account_key: &Assertion) -> Result<PublicKey> {
    let text = std::str::from_utf8(account_key.body()).map_err(|_| {
        TrustError::ConsistencyViolation {
            reference: account_key.reference(),
            reason: "account-key body is not valid UTF-8".into(),
        }
    })?;
    PublicKey::decode(text).map_err(|e| TrustError::ConsistencyViolation {
        reference: account_key.reference(),
        reason: format!("account-key body: {}", e),
    })
}

fn check_key_window(account_key: &Assertion, now: DateTime<Utc>) -> std::result::Result<(), String> {
    let key_id = account_key.header_str("public-key-sha3-384").unwrap_or_default();
    if let Some(since) = account_key.header_time("since") {
        if now < since {
            return Err(format!("signing key {} is not valid before {}", key_id, since));
        }
    }
    if let Some(until) = account_key.header_time("until") {
        if now >= until {
            return Err(format!("signing key {} expired at {}", key_id, until));
        }
    }
    Ok(())
}
