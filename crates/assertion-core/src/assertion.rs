//! Assertions: typed, signed statements
//!
//! An [`Assertion`] is immutable once decoded or signed. It keeps the exact
//! signed content bytes alongside the parsed headers so that re-encoding is
//! byte-identical and signature checks never depend on re-serialization.

use crate::crypto::{KeyPair, PublicKey};
use crate::encoding::{self, SEPARATOR};
use crate::error::{AssertionError, ParseError, Result};
use crate::header::{HeaderValue, Headers};
use crate::registry::{
    AssertionType, SignerRule, TypeDescriptor, AUTHORITY_ID, BODY_LENGTH, REVISION, SIGN_KEY,
    TYPE,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// A decoded, signed assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    assertion_type: AssertionType,
    headers: Headers,
    body: Vec<u8>,
    /// Exact bytes covered by the signature
    content: Vec<u8>,
    /// Signature block, verbatim
    signature: Vec<u8>,
}

impl Assertion {
    pub(crate) fn from_parts(
        assertion_type: AssertionType,
        headers: Headers,
        body: Vec<u8>,
        content: Vec<u8>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            assertion_type,
            headers,
            body,
            content,
            signature,
        }
    }

    /// Start building an assertion of the given type
    pub fn builder(assertion_type: AssertionType) -> AssertionBuilder {
        AssertionBuilder::new(assertion_type)
    }

    /// Decode from the text encoding
    pub fn decode(data: &[u8]) -> std::result::Result<Self, ParseError> {
        encoding::decode(data)
    }

    /// Encode to the text encoding (content + separator + signature)
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.content.len() + SEPARATOR.len() + self.signature.len());
        out.extend_from_slice(&self.content);
        out.extend_from_slice(SEPARATOR);
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn assertion_type(&self) -> AssertionType {
        self.assertion_type
    }

    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.assertion_type.descriptor()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Text header value (timestamps included)
    pub fn header_str(&self, name: &str) -> Option<&str> {
        if name == TYPE {
            return Some(self.assertion_type.name());
        }
        self.headers.get(name).and_then(HeaderValue::as_str)
    }

    pub fn header_u64(&self, name: &str) -> Option<u64> {
        self.headers.get(name).and_then(HeaderValue::as_u64)
    }

    pub fn header_list(&self, name: &str) -> Option<&[String]> {
        self.headers.get(name).and_then(HeaderValue::as_list)
    }

    /// Parse a timestamp header
    pub fn header_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.header_str(name)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Account that issued (signed) this assertion
    pub fn authority_id(&self) -> &str {
        self.header_str(AUTHORITY_ID).unwrap_or_default()
    }

    /// Key ID of the signing key
    pub fn sign_key_id(&self) -> &str {
        self.header_str(SIGN_KEY).unwrap_or_default()
    }

    /// Revision (0 when the header is absent)
    pub fn revision(&self) -> u64 {
        self.header_u64(REVISION).unwrap_or(0)
    }

    /// Sequence number, for sequence-forming types
    pub fn sequence(&self) -> Option<u64> {
        self.descriptor()
            .sequence
            .and_then(|header| self.header_u64(header))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Primary-key values in descriptor order
    pub fn primary_key(&self) -> Vec<String> {
        self.descriptor()
            .primary_key
            .iter()
            .filter_map(|name| self.headers.get(*name).and_then(HeaderValue::to_scalar))
            .collect()
    }

    /// Values of the subject key (primary key minus any sequence number)
    pub fn subject_key(&self) -> Vec<String> {
        self.descriptor()
            .subject_key()
            .iter()
            .filter_map(|name| self.headers.get(*name).and_then(HeaderValue::to_scalar))
            .collect()
    }

    pub fn reference(&self) -> Reference {
        Reference::new(self.assertion_type, self.primary_key())
    }

    /// Verify the signature against the given key
    ///
    /// The key must be the one named by `sign-key-sha3-384`.
    pub fn verify_signature(&self, key: &PublicKey) -> Result<()> {
        if key.key_id() != self.sign_key_id() {
            return Err(AssertionError::InvalidSignature {
                key_id: key.key_id().to_string(),
                reason: format!("assertion names signing key {}", self.sign_key_id()),
            });
        }

        let text = std::str::from_utf8(&self.signature).map_err(|_| {
            AssertionError::InvalidSignature {
                key_id: key.key_id().to_string(),
                reason: "signature block is not valid UTF-8".into(),
            }
        })?;
        let raw = STANDARD
            .decode(text.trim())
            .map_err(|e| AssertionError::InvalidSignature {
                key_id: key.key_id().to_string(),
                reason: format!("signature block is not valid base64: {}", e),
            })?;

        key.verify(&self.content, &raw)
    }

    /// Verify a self-signed assertion against the key it carries
    ///
    /// Returns the embedded key on success.
    pub fn verify_self_signed(&self) -> Result<PublicKey> {
        let header = match self.descriptor().signer {
            SignerRule::SelfSigned(header) => header,
            SignerRule::AccountKey => {
                return Err(AssertionError::SelfSignatureMismatch(format!(
                    "{} assertions are not self-signed",
                    self.assertion_type
                )))
            }
        };

        let encoded = self.header_str(header).ok_or_else(|| {
            AssertionError::SelfSignatureMismatch(format!("missing '{}' header", header))
        })?;
        let key = PublicKey::decode(encoded)?;

        if key.key_id() != self.sign_key_id() {
            return Err(AssertionError::SelfSignatureMismatch(format!(
                "'{}' does not match the signing key {}",
                header,
                self.sign_key_id()
            )));
        }

        self.verify_signature(&key)?;
        Ok(key)
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (revision {})", self.reference(), self.revision())
    }
}

/// Type plus primary key: identifies one stored assertion
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub assertion_type: AssertionType,
    pub primary_key: Vec<String>,
}

impl Reference {
    pub fn new(assertion_type: AssertionType, primary_key: Vec<String>) -> Self {
        Self {
            assertion_type,
            primary_key,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.assertion_type.name())?;
        for component in &self.primary_key {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

/// Builder for signing new assertions
///
/// `sign-key-sha3-384` and `body-length` are filled in by [`sign`](Self::sign);
/// setting them (or `type`) explicitly is an error.
#[derive(Debug, Clone)]
pub struct AssertionBuilder {
    assertion_type: AssertionType,
    headers: Headers,
    body: Vec<u8>,
    reserved: Option<String>,
}

impl AssertionBuilder {
    pub fn new(assertion_type: AssertionType) -> Self {
        Self {
            assertion_type,
            headers: Headers::new(),
            body: Vec::new(),
            reserved: None,
        }
    }

    /// Set a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        let name = name.into();
        if matches!(name.as_str(), TYPE | SIGN_KEY | BODY_LENGTH) {
            self.reserved.get_or_insert(name);
            return self;
        }
        self.headers.insert(name, value.into());
        self
    }

    /// Set `authority-id`
    pub fn authority(self, account_id: impl Into<String>) -> Self {
        self.header(AUTHORITY_ID, account_id.into())
    }

    /// Set `revision`
    pub fn revision(self, revision: u64) -> Self {
        self.header(REVISION, revision)
    }

    /// Set a timestamp header from a UTC time
    pub fn timestamp(self, name: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.header(name, at.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sign with the given key and validate the result against the registry
    pub fn sign(self, key: &KeyPair) -> Result<Assertion> {
        if let Some(name) = self.reserved {
            return Err(AssertionError::ReservedHeader(name));
        }

        let mut headers = self.headers;
        headers.insert(SIGN_KEY.to_string(), HeaderValue::Text(key.key_id().to_string()));
        if !self.body.is_empty() {
            headers.insert(
                BODY_LENGTH.to_string(),
                HeaderValue::Integer(self.body.len() as u64),
            );
        }

        let mut encoded = encoding::encode_content(self.assertion_type, &headers, &self.body);
        let signature = STANDARD.encode(key.sign(&encoded));
        encoded.extend_from_slice(SEPARATOR);
        encoded.extend_from_slice(signature.as_bytes());

        Ok(encoding::decode(&encoded)?)
    }
}
