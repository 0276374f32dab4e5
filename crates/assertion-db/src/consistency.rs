//! Type-specific consistency checks
//!
//! The registry names the checks each type needs; this module gives each name
//! its meaning against the current database contents.

use crate::error::{Result, TrustError};
use crate::roots::TrustedRoots;
use crate::storage::AssertionStore;
use crate::verify::account_key_public_key;
use assertion_core::{is_valid_name, Assertion, AssertionType, Consistency, PublicKey, Reference};
use tracing::warn;

/// Run every consistency check declared for the assertion's type
pub async fn check_consistency(
    assertion: &Assertion,
    store: &dyn AssertionStore,
    roots: &TrustedRoots,
) -> Result<()> {
    for check in assertion.descriptor().consistency {
        let outcome = run_check(*check, assertion, store, roots).await;
        if let Err(ref e) = outcome {
            warn!(reference = %assertion.reference(), check = ?check, error = %e, "Consistency check failed");
        }
        outcome?;
    }
    Ok(())
}

async fn run_check(
    check: Consistency,
    assertion: &Assertion,
    store: &dyn AssertionStore,
    roots: &TrustedRoots,
) -> Result<()> {
    let violation = |reason: String| TrustError::ConsistencyViolation {
        reference: assertion.reference(),
        reason,
    };

    match check {
        Consistency::AuthorityMatches(header) => {
            let value = assertion.header_str(header).unwrap_or_default();
            if value != assertion.authority_id() {
                return Err(violation(format!(
                    "authority-id {} does not match {} {}",
                    assertion.authority_id(),
                    header,
                    value
                )));
            }
        }
        Consistency::KeyBodyMatchesId => {
            let key = account_key_public_key(assertion)?;
            let declared = assertion.header_str("public-key-sha3-384").unwrap_or_default();
            if key.key_id() != declared {
                return Err(violation(format!(
                    "body holds key {}, but public-key-sha3-384 is {}",
                    key.key_id(),
                    declared
                )));
            }
        }
        Consistency::AccountExists(header) => {
            let account_id = assertion.header_str(header).unwrap_or_default().to_string();
            if !roots.is_root_account(&account_id) {
                let primary_key = vec![account_id];
                if store.get(AssertionType::Account, &primary_key).await?.is_none() {
                    return Err(TrustError::MissingPrerequisite {
                        reference: assertion.reference(),
                        missing: Reference::new(AssertionType::Account, primary_key),
                    });
                }
            }
        }
        Consistency::DeviceKeyMatchesId => {
            let encoded = assertion.header_str("device-key").unwrap_or_default();
            let key = PublicKey::decode(encoded)
                .map_err(|e| violation(format!("device-key: {}", e)))?;
            let declared = assertion.header_str("device-key-sha3-384").unwrap_or_default();
            if key.key_id() != declared {
                return Err(violation(format!(
                    "device-key has id {}, but device-key-sha3-384 is {}",
                    key.key_id(),
                    declared
                )));
            }
        }
        Consistency::ModelExists => {
            let primary_key = vec![
                assertion.header_str("brand-id").unwrap_or_default().to_string(),
                assertion.header_str("model").unwrap_or_default().to_string(),
            ];
            if store.get(AssertionType::Model, &primary_key).await?.is_none() {
                return Err(TrustError::MissingPrerequisite {
                    reference: assertion.reference(),
                    missing: Reference::new(AssertionType::Model, primary_key),
                });
            }
        }
        Consistency::ValidName(header) => {
            let name = assertion.header_str(header).unwrap_or_default();
            if !is_valid_name(name) {
                return Err(violation(format!("invalid {} {:?}", header, name)));
            }
        }
        Consistency::SequencePositive => {
            if assertion.sequence().unwrap_or(0) < 1 {
                return Err(violation("sequence must be at least 1".into()));
            }
        }
    }
    Ok(())
}
