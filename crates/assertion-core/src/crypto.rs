//! Key identity and signing primitives
//!
//! Assertions are signed with Ed25519 keys. A key is referenced from an
//! assertion by its key ID: the SHA3-384 digest of the canonical public key
//! encoding, rendered as unpadded URL-safe base64 (64 characters).
//!
//! Key types:
//! - `KeyPair`: Ed25519 key pair used by authorities and devices to sign
//! - `PublicKey`: verifying half, carried in `account-key` bodies and
//!   `device-key` headers

use crate::error::{AssertionError, Result};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_384};

/// Algorithm tag leading the canonical public key encoding
const ALGORITHM_ED25519: u8 = 0x01;

/// Length of a key ID in characters (base64 of 48 digest bytes)
pub const KEY_ID_LEN: usize = 64;

/// Ed25519 key pair for signing assertions
#[derive(Clone)]
pub struct KeyPair {
    /// Ed25519 signing key (private)
    signing_key: SigningKey,
    /// Public half, with its key ID precomputed
    public_key: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.public_key.key_id)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey::from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            public_key,
        }
    }

    /// Create a key pair from a raw 32-byte seed
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    /// Key ID of the public half
    pub fn key_id(&self) -> &str {
        self.public_key.key_id()
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Get the raw signing key bytes
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign arbitrary content, returning the raw 64-byte signature
    pub fn sign(&self, content: &[u8]) -> Vec<u8> {
        self.signing_key.sign(content).to_bytes().to_vec()
    }
}

/// Ed25519 public key with its derived key ID
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
    key_id: String,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl PublicKey {
    fn from_verifying_key(verifying_key: VerifyingKey) -> Self {
        let key_id = key_id_of(&canonical_bytes(&verifying_key));
        Self {
            verifying_key,
            key_id,
        }
    }

    /// Create a public key from raw Ed25519 bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes)?;
        Ok(Self::from_verifying_key(verifying_key))
    }

    /// Decode the canonical encoding (algorithm tag + key bytes)
    pub fn from_canonical(bytes: &[u8]) -> Result<Self> {
        match bytes.split_first() {
            Some((&ALGORITHM_ED25519, key)) => {
                let key: [u8; 32] = key.try_into().map_err(|_| {
                    AssertionError::InvalidKey(format!(
                        "invalid Ed25519 key length: {}, expected 32",
                        key.len()
                    ))
                })?;
                Self::from_bytes(&key)
            }
            Some((tag, _)) => Err(AssertionError::InvalidKey(format!(
                "unsupported key algorithm tag {:#04x}",
                tag
            ))),
            None => Err(AssertionError::InvalidKey("empty key encoding".into())),
        }
    }

    /// Decode the text form used in headers and account-key bodies
    pub fn decode(text: &str) -> Result<Self> {
        let bytes = STANDARD.decode(text.trim())?;
        Self::from_canonical(&bytes)
    }

    /// The stable key ID (SHA3-384 of the canonical encoding)
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Get the raw verifying key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Canonical byte encoding hashed into the key ID
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.verifying_key)
    }

    /// Text form: standard base64 of the canonical encoding
    pub fn encode(&self) -> String {
        STANDARD.encode(self.canonical_bytes())
    }

    /// Verify a raw signature over content
    pub fn verify(&self, content: &[u8], signature: &[u8]) -> Result<()> {
        let signature_bytes: [u8; 64] =
            signature
                .try_into()
                .map_err(|_| AssertionError::InvalidSignature {
                    key_id: self.key_id.clone(),
                    reason: format!("invalid signature length: {}", signature.len()),
                })?;
        let signature = Signature::from_bytes(&signature_bytes);

        self.verifying_key
            .verify(content, &signature)
            .map_err(|e| AssertionError::InvalidSignature {
                key_id: self.key_id.clone(),
                reason: e.to_string(),
            })
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        PublicKey::decode(&text).map_err(serde::de::Error::custom)
    }
}

fn canonical_bytes(key: &VerifyingKey) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(33);
    bytes.push(ALGORITHM_ED25519);
    bytes.extend_from_slice(key.as_bytes());
    bytes
}

/// Compute the key ID for a canonical key encoding
pub fn key_id_of(canonical: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha3_384::digest(canonical))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_is_stable() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_bytes(&kp.signing_key_bytes());

        assert_eq!(kp.key_id(), restored.key_id());
        assert_eq!(kp.key_id(), key_id_of(&kp.public_key().canonical_bytes()));
    }

    #[test]
    fn test_key_id_shape() {
        let kp = KeyPair::generate();
        let kid = kp.key_id();

        assert_eq!(kid.len(), KEY_ID_LEN);
        assert!(kid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_distinct_keys_have_distinct_ids() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();

        assert_ne!(kp1.key_id(), kp2.key_id());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"type: account\n");

        assert_eq!(sig.len(), 64);
        assert!(kp.public_key().verify(b"type: account\n", &sig).is_ok());
    }

    #[test]
    fn test_verification_fails_with_wrong_key() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();
        let sig = kp1.sign(b"content");

        let result = kp2.public_key().verify(b"content", &sig);
        assert!(matches!(
            result,
            Err(AssertionError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_verification_fails_on_truncated_signature() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"content");

        assert!(kp.public_key().verify(b"content", &sig[..63]).is_err());
    }

    #[test]
    fn test_text_encoding_roundtrip() {
        let kp = KeyPair::generate();
        let text = kp.public_key().encode();
        let decoded = PublicKey::decode(&text).unwrap();

        assert_eq!(&decoded, kp.public_key());
        assert_eq!(decoded.key_id(), kp.key_id());
    }

    #[test]
    fn test_unknown_algorithm_tag_rejected() {
        let mut bytes = KeyPair::generate().public_key().canonical_bytes();
        bytes[0] = 0x7f;

        assert!(matches!(
            PublicKey::from_canonical(&bytes),
            Err(AssertionError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_public_key_serde() {
        let kp = KeyPair::generate();
        let json = serde_json::to_string(kp.public_key()).unwrap();
        let restored: PublicKey = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.key_id(), kp.key_id());
    }
}
