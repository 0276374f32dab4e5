//! Integration Tests for the Trust Database
//!
//! These tests verify:
//! - Revision monotonicity per primary key
//! - Chain-of-trust verification (prerequisites, signatures, cycles, revocation)
//! - Sequence lookups and header search
//! - Atomic adds under concurrent readers

use assertion_core::{Assertion, AssertionType, KeyPair};
use assertion_db::{
    AssertionStore, FsStore, MemoryStore, TrustDatabase, TrustError, TrustedRoot, TrustedRoots,
};
use std::sync::Arc;

// =============================================================================
// Test Helpers
// =============================================================================

const TIMESTAMP: &str = "2024-01-01T00:00:00Z";

struct Fixture {
    root: KeyPair,
    acme: KeyPair,
    store: Arc<MemoryStore>,
    db: TrustDatabase,
}

fn trusted_roots(root: &KeyPair) -> Arc<TrustedRoots> {
    Arc::new(TrustedRoots::new([TrustedRoot::new(
        "canonical",
        root.public_key().clone(),
    )]))
}

fn account(root: &KeyPair, account_id: &str, revision: u64) -> Assertion {
    Assertion::builder(AssertionType::Account)
        .authority("canonical")
        .header("account-id", account_id)
        .header("display-name", format!("{} Inc.", account_id))
        .header("validation", "verified")
        .header("timestamp", TIMESTAMP)
        .revision(revision)
        .sign(root)
        .expect("account should sign")
}

fn account_key(
    signer: &KeyPair,
    authority: &str,
    owner: &str,
    key: &KeyPair,
    until: Option<&str>,
    revision: u64,
) -> Assertion {
    let mut builder = Assertion::builder(AssertionType::AccountKey)
        .authority(authority)
        .header("account-id", owner)
        .header("name", "default")
        .header("public-key-sha3-384", key.key_id())
        .header("since", "2020-01-01T00:00:00Z")
        .revision(revision)
        .body(key.public_key().encode());
    if let Some(until) = until {
        builder = builder.header("until", until);
    }
    builder.sign(signer).expect("account-key should sign")
}

fn model(signer: &KeyPair, brand: &str, name: &str, revision: u64) -> Assertion {
    Assertion::builder(AssertionType::Model)
        .authority(brand)
        .header("brand-id", brand)
        .header("model", name)
        .header("architecture", "amd64")
        .header("timestamp", TIMESTAMP)
        .revision(revision)
        .sign(signer)
        .expect("model should sign")
}

fn serial(root: &KeyPair, model: &str, serial: &str, device: &KeyPair) -> Assertion {
    Assertion::builder(AssertionType::Serial)
        .authority("canonical")
        .header("brand-id", "acme")
        .header("model", model)
        .header("serial", serial)
        .header("device-key", device.public_key().encode())
        .header("device-key-sha3-384", device.key_id())
        .header("timestamp", TIMESTAMP)
        .sign(root)
        .expect("serial should sign")
}

fn validation_set(signer: &KeyPair, name: &str, sequence: u64) -> Assertion {
    Assertion::builder(AssertionType::ValidationSet)
        .authority("acme")
        .header("account-id", "acme")
        .header("name", name)
        .header("sequence", sequence)
        .header("snaps", vec![format!("app-{}", sequence)])
        .header("timestamp", TIMESTAMP)
        .sign(signer)
        .expect("validation-set should sign")
}

/// Database holding the acme account and its signing key
async fn fixture() -> Fixture {
    let root = KeyPair::generate();
    let acme = KeyPair::generate();
    let store = Arc::new(MemoryStore::new());
    let db = TrustDatabase::new(trusted_roots(&root), store.clone());

    db.add(account(&root, "acme", 0)).await.unwrap();
    db.add(account_key(&root, "canonical", "acme", &acme, None, 0))
        .await
        .unwrap();

    Fixture {
        root,
        acme,
        store,
        db,
    }
}

// =============================================================================
// Revisions
// =============================================================================

#[tokio::test]
async fn test_revision_monotonicity() {
    let f = fixture().await;
    f.db.add(model(&f.acme, "acme", "widget", 3)).await.unwrap();

    for stale in [0, 3] {
        let err = f
            .db
            .add(model(&f.acme, "acme", "widget", stale))
            .await
            .unwrap_err();
        assert!(
            matches!(err, TrustError::RevisionConflict { current: 3, attempted, .. } if attempted == stale),
            "unexpected error: {}",
            err
        );
    }

    f.db.add(model(&f.acme, "acme", "widget", 4)).await.unwrap();
    let found = f.db.find(AssertionType::Model, &["acme", "widget"]).await.unwrap();
    assert_eq!(found.revision(), 4);
}

#[tokio::test]
async fn test_failed_add_leaves_state_unchanged() {
    let f = fixture().await;
    let before = f.store.len();

    let err = f
        .db
        .add(model(&f.acme, "acme", "Not A Name", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::ConsistencyViolation { .. }));
    assert_eq!(f.store.len(), before);
}

// =============================================================================
// Chain of Trust
// =============================================================================

#[tokio::test]
async fn test_missing_prerequisite_then_success() {
    let root = KeyPair::generate();
    let acme = KeyPair::generate();
    let db = TrustDatabase::in_memory(trusted_roots(&root));

    let widget = model(&acme, "acme", "widget", 0);
    let err = db.add(widget.clone()).await.unwrap_err();
    match err {
        TrustError::MissingPrerequisite { missing, .. } => {
            assert_eq!(missing.assertion_type, AssertionType::AccountKey);
            assert_eq!(missing.primary_key, vec![acme.key_id().to_string()]);
        }
        other => panic!("expected MissingPrerequisite, got {}", other),
    }

    db.add(account(&root, "acme", 0)).await.unwrap();
    db.add(account_key(&root, "canonical", "acme", &acme, None, 0))
        .await
        .unwrap();

    let chain = db.add(widget).await.unwrap();
    assert!(chain.is_rooted());
    assert_eq!(chain.root_key_ids, vec![root.key_id().to_string()]);
    assert_eq!(chain.links[0].reference.to_string(), "model/acme/widget");
    assert_eq!(chain.links[0].signer_key_id, acme.key_id());
}

#[tokio::test]
async fn test_forged_signature_rejected() {
    let f = fixture().await;
    let mallory = KeyPair::generate();

    // Signed by mallory, but claims to be signed by acme's key
    let forged = model(&mallory, "acme", "widget", 0);
    let text = String::from_utf8(forged.encode())
        .unwrap()
        .replace(mallory.key_id(), f.acme.key_id());
    let forged = Assertion::decode(text.as_bytes()).unwrap();

    let err = f.db.add(forged).await.unwrap_err();
    assert!(matches!(err, TrustError::InvalidSignature { .. }), "got {}", err);
}

#[tokio::test]
async fn test_authority_must_own_signing_key() {
    let f = fixture().await;
    let globex = KeyPair::generate();
    f.db.add(account(&f.root, "globex", 0)).await.unwrap();
    f.db.add(account_key(&f.root, "canonical", "globex", &globex, None, 0))
        .await
        .unwrap();

    // acme model signed with globex's key
    let err = f
        .db
        .add(model(&globex, "acme", "widget", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::ConsistencyViolation { .. }), "got {}", err);
}

#[tokio::test]
async fn test_brand_must_match_authority() {
    let f = fixture().await;
    let mismatched = Assertion::builder(AssertionType::Model)
        .authority("acme")
        .header("brand-id", "globex")
        .header("model", "widget")
        .header("architecture", "amd64")
        .header("timestamp", TIMESTAMP)
        .sign(&f.acme)
        .unwrap();

    let err = f.db.add(mismatched).await.unwrap_err();
    assert!(matches!(err, TrustError::ConsistencyViolation { .. }), "got {}", err);
}

#[tokio::test]
async fn test_self_certified_cycle_is_broken_chain() {
    let f = fixture().await;
    let rogue = KeyPair::generate();

    // Bypass the database: the rogue account vouches for itself
    f.store.put(&account_key(&rogue, "rogue", "rogue", &rogue, None, 0)).await.unwrap();
    let rogue_account = Assertion::builder(AssertionType::Account)
        .authority("rogue")
        .header("account-id", "rogue")
        .header("display-name", "Rogue")
        .header("validation", "unproven")
        .header("timestamp", TIMESTAMP)
        .sign(&rogue)
        .unwrap();
    f.store.put(&rogue_account).await.unwrap();

    let err = f
        .db
        .add(model(&rogue, "rogue", "widget", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::BrokenChain { .. }), "got {}", err);
}

#[tokio::test]
async fn test_revoked_key_breaks_chain() {
    let f = fixture().await;
    let widget = model(&f.acme, "acme", "widget", 0);
    f.db.add(widget.clone()).await.unwrap();
    assert!(f.db.verify(&widget).await.is_ok());

    // Revocation: a newer revision of the key whose validity ended in the past
    f.db.add(account_key(
        &f.root,
        "canonical",
        "acme",
        &f.acme,
        Some("2021-01-01T00:00:00Z"),
        1,
    ))
    .await
    .unwrap();

    let err = f.db.verify(&widget).await.unwrap_err();
    assert!(matches!(err, TrustError::BrokenChain { .. }), "got {}", err);

    // The old model is shadowed, not deleted
    assert!(f.db.find(AssertionType::Model, &["acme", "widget"]).await.is_ok());
}

#[tokio::test]
async fn test_revoked_root_key_breaks_chain() {
    let f = fixture().await;
    let acme_account = f.db.find(AssertionType::Account, &["acme"]).await.unwrap();

    f.db.add(account_key(
        &f.root,
        "canonical",
        "canonical",
        &f.root,
        Some("2021-01-01T00:00:00Z"),
        1,
    ))
    .await
    .unwrap();

    let err = f.db.add(account(&f.root, "globex", 0)).await.unwrap_err();
    assert!(matches!(err, TrustError::BrokenChain { .. }), "got {}", err);
    assert!(f.db.find(AssertionType::Account, &["globex"]).await.is_err());

    let err = f.db.verify(&acme_account).await.unwrap_err();
    assert!(matches!(err, TrustError::BrokenChain { .. }), "got {}", err);
}

#[tokio::test]
async fn test_root_key_registered_to_other_account() {
    let f = fixture().await;

    f.db.add(account_key(&f.root, "canonical", "acme", &f.root, None, 0))
        .await
        .unwrap();

    let err = f.db.add(account(&f.root, "globex", 0)).await.unwrap_err();
    assert!(matches!(err, TrustError::BrokenChain { .. }), "got {}", err);
}

#[tokio::test]
async fn test_serial_requires_model() {
    let f = fixture().await;
    let device = KeyPair::generate();

    let err = f
        .db
        .add(serial(&f.root, "widget", "10001", &device))
        .await
        .unwrap_err();
    match err {
        TrustError::MissingPrerequisite { missing, .. } => {
            assert_eq!(missing.to_string(), "model/acme/widget");
        }
        other => panic!("expected MissingPrerequisite, got {}", other),
    }

    f.db.add(model(&f.acme, "acme", "widget", 0)).await.unwrap();
    f.db.add(serial(&f.root, "widget", "10001", &device))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_serial_requests_are_not_storable() {
    let f = fixture().await;
    let device = KeyPair::generate();
    let request = Assertion::builder(AssertionType::SerialRequest)
        .authority("acme")
        .header("brand-id", "acme")
        .header("model", "widget")
        .header("request-id", "REQ-1")
        .header("device-key", device.public_key().encode())
        .sign(&device)
        .unwrap();

    assert!(matches!(
        f.db.add(request).await,
        Err(TrustError::Unstorable(AssertionType::SerialRequest))
    ));
}

#[tokio::test]
async fn test_check_does_not_store() {
    let f = fixture().await;
    let widget = model(&f.acme, "acme", "widget", 0);

    f.db.check(&widget).await.unwrap();
    assert!(matches!(
        f.db.find(AssertionType::Model, &["acme", "widget"]).await,
        Err(TrustError::NotFound(_))
    ));
}

// =============================================================================
// Lookups
// =============================================================================

#[tokio::test]
async fn test_find_sequence() {
    let f = fixture().await;
    for sequence in [1, 2, 3] {
        f.db.add(validation_set(&f.acme, "base", sequence))
            .await
            .unwrap();
    }
    f.db.add(validation_set(&f.acme, "other", 7)).await.unwrap();

    let next = f
        .db
        .find_sequence(AssertionType::ValidationSet, &["acme", "base"], Some(1))
        .await
        .unwrap();
    assert_eq!(next.sequence(), Some(2));

    let latest = f
        .db
        .find_sequence(AssertionType::ValidationSet, &["acme", "base"], None)
        .await
        .unwrap();
    assert_eq!(latest.sequence(), Some(3));

    assert!(matches!(
        f.db
            .find_sequence(AssertionType::ValidationSet, &["acme", "base"], Some(3))
            .await,
        Err(TrustError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_sequence_zero_rejected() {
    let f = fixture().await;
    let err = f.db.add(validation_set(&f.acme, "base", 0)).await.unwrap_err();
    assert!(matches!(err, TrustError::ConsistencyViolation { .. }));
}

#[tokio::test]
async fn test_find_by_partial_key_and_headers() {
    let f = fixture().await;
    f.db.add(model(&f.acme, "acme", "widget", 0)).await.unwrap();
    f.db.add(model(&f.acme, "acme", "gadget", 0)).await.unwrap();
    let device = KeyPair::generate();
    f.db.add(serial(&f.root, "widget", "10001", &device))
        .await
        .unwrap();

    let found = f
        .db
        .find(AssertionType::Serial, &["acme", "widget"])
        .await
        .unwrap();
    assert_eq!(found.header_str("serial"), Some("10001"));

    assert!(matches!(
        f.db.find(AssertionType::Model, &["acme"]).await,
        Err(TrustError::Ambiguous { matches: 2, .. })
    ));

    let by_device = f
        .db
        .find_all(AssertionType::Serial, &[("device-key-sha3-384", device.key_id())])
        .await
        .unwrap();
    assert_eq!(by_device.len(), 1);

    let models = f
        .db
        .find_all(AssertionType::Model, &[("brand-id", "acme")])
        .await
        .unwrap();
    let names: Vec<_> = models.iter().filter_map(|m| m.header_str("model")).collect();
    assert_eq!(names, vec!["gadget", "widget"]);
}

// =============================================================================
// Concurrency & Persistence
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_adds() {
    let f = fixture().await;
    let db = Arc::new(f.db);
    let acme = f.acme;

    let mut readers = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                match db.find(AssertionType::Model, &["acme", "widget"]).await {
                    Ok(found) => assert!(found.revision() <= 9),
                    Err(TrustError::NotFound(_)) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for revision in 0..10 {
        db.add(model(&acme, "acme", "widget", revision)).await.unwrap();
    }
    for reader in readers {
        reader.await.unwrap();
    }

    let found = db.find(AssertionType::Model, &["acme", "widget"]).await.unwrap();
    assert_eq!(found.revision(), 9);
}

#[tokio::test]
async fn test_filesystem_backed_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let root = KeyPair::generate();
    let acme = KeyPair::generate();

    {
        let store = Arc::new(FsStore::open(dir.path()).await.unwrap());
        let db = TrustDatabase::new(trusted_roots(&root), store);
        db.add(account(&root, "acme", 0)).await.unwrap();
        db.add(account_key(&root, "canonical", "acme", &acme, None, 0))
            .await
            .unwrap();
        db.add(model(&acme, "acme", "widget", 0)).await.unwrap();
    }

    let store = Arc::new(FsStore::open(dir.path()).await.unwrap());
    let db = TrustDatabase::new(trusted_roots(&root), store);
    let widget = db.find(AssertionType::Model, &["acme", "widget"]).await.unwrap();
    db.verify(&widget).await.unwrap();

    let err = db.add(model(&acme, "acme", "widget", 0)).await.unwrap_err();
    assert!(matches!(err, TrustError::RevisionConflict { .. }));
}
