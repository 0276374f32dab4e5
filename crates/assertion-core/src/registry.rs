//! Assertion type registry
//!
//! Static, read-only metadata for every assertion type: primary-key shape,
//! mandatory headers, typed headers, body rule, signer rule, sequence
//! semantics and the named consistency checks the trust database runs at
//! add time. New types are added as a new row in `DESCRIPTORS`.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Header naming the assertion type (always the first header)
pub const TYPE: &str = "type";
/// Header naming the issuing account
pub const AUTHORITY_ID: &str = "authority-id";
/// Header carrying the key ID of the signing key
pub const SIGN_KEY: &str = "sign-key-sha3-384";
/// Revision header (integer, default 0)
pub const REVISION: &str = "revision";
/// Body length header (present iff the body is non-empty)
pub const BODY_LENGTH: &str = "body-length";

/// Headers every assertion must carry (besides `type`)
const COMMON_MANDATORY: &[&str] = &[AUTHORITY_ID, SIGN_KEY];

/// The fixed set of assertion types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionType {
    /// An account (publisher/brand/authority identity)
    Account,
    /// A public key owned by an account
    AccountKey,
    /// A device model definition
    Model,
    /// A device identity credential
    Serial,
    /// A self-signed request for a serial
    SerialRequest,
    /// An append-only sequence of validation policies
    ValidationSet,
}

impl AssertionType {
    /// Every registered type
    pub const ALL: [AssertionType; 6] = [
        AssertionType::Account,
        AssertionType::AccountKey,
        AssertionType::Model,
        AssertionType::Serial,
        AssertionType::SerialRequest,
        AssertionType::ValidationSet,
    ];

    /// Wire name of the type
    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Static descriptor for the type
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        // DESCRIPTORS is indexed in declaration order of the enum
        &DESCRIPTORS[*self as usize]
    }
}

impl fmt::Display for AssertionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AssertionType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        describe(s).map(|d| d.assertion_type)
    }
}

/// Declared kind of a header value, checked at decode time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// Single-line string
    Text,
    /// Non-negative decimal integer without leading zeros
    Integer,
    /// RFC 3339 timestamp (stored as text)
    Timestamp,
    /// Non-empty list of strings
    List,
}

/// Whether a type carries a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRule {
    Optional,
    Required,
    Forbidden,
}

/// How the signing key of an assertion is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerRule {
    /// Signed by an account-key (or a trusted root) named by `sign-key-sha3-384`
    AccountKey,
    /// Signed by the public key carried in the named header
    SelfSigned(&'static str),
}

/// Named consistency checks, evaluated by the trust database at add time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// `authority-id` must equal the value of the named header
    AuthorityMatches(&'static str),
    /// Account-key body must decode to the key named by `public-key-sha3-384`
    KeyBodyMatchesId,
    /// The account named by the header must be known (or be a root account)
    AccountExists(&'static str),
    /// `device-key-sha3-384` must be the key ID of `device-key`
    DeviceKeyMatchesId,
    /// The model named by `brand-id`/`model` must already be stored
    ModelExists,
    /// The named header must be a valid model/account name
    ValidName(&'static str),
    /// The sequence header must be at least 1
    SequencePositive,
}

/// Static metadata for one assertion type
#[derive(Debug)]
pub struct TypeDescriptor {
    /// Enum value
    pub assertion_type: AssertionType,
    /// Wire name
    pub name: &'static str,
    /// Ordered primary-key header names (empty = not storable)
    pub primary_key: &'static [&'static str],
    /// Mandatory headers beyond the common ones
    pub mandatory: &'static [&'static str],
    /// Declared header kinds (undeclared headers default to Text/List by shape)
    pub headers: &'static [(&'static str, HeaderKind)],
    /// Body rule
    pub body: BodyRule,
    /// How the signer is resolved
    pub signer: SignerRule,
    /// For sequence-forming types, the integer sequence header (last primary-key element)
    pub sequence: Option<&'static str>,
    /// Consistency checks run at add time
    pub consistency: &'static [Consistency],
}

impl TypeDescriptor {
    /// Declared kind of a header, if any
    pub fn header_kind(&self, header: &str) -> Option<HeaderKind> {
        match header {
            REVISION | BODY_LENGTH => Some(HeaderKind::Integer),
            TYPE | AUTHORITY_ID | SIGN_KEY => Some(HeaderKind::Text),
            _ => self
                .headers
                .iter()
                .find(|(name, _)| *name == header)
                .map(|(_, kind)| *kind)
                .or_else(|| {
                    // Primary-key components are always scalars
                    self.primary_key
                        .iter()
                        .any(|pk| *pk == header)
                        .then_some(HeaderKind::Text)
                }),
        }
    }

    /// All mandatory headers, common ones first
    pub fn mandatory_headers(&self) -> impl Iterator<Item = &'static str> {
        COMMON_MANDATORY
            .iter()
            .chain(self.mandatory.iter())
            .copied()
    }

    /// Whether assertions of this type can be stored in a trust database
    pub fn is_storable(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Whether the type forms ordered sequences per subject
    pub fn is_sequence_forming(&self) -> bool {
        self.sequence.is_some()
    }

    /// Primary-key headers identifying the subject of a sequence
    /// (the primary key without its trailing sequence number)
    pub fn subject_key(&self) -> &'static [&'static str] {
        let primary_key: &'static [&'static str] = self.primary_key;
        match self.sequence {
            Some(_) => &primary_key[..primary_key.len() - 1],
            None => primary_key,
        }
    }
}

static DESCRIPTORS: [TypeDescriptor; 6] = [
    TypeDescriptor {
        assertion_type: AssertionType::Account,
        name: "account",
        primary_key: &["account-id"],
        mandatory: &["account-id", "display-name", "validation", "timestamp"],
        headers: &[
            ("account-id", HeaderKind::Text),
            ("display-name", HeaderKind::Text),
            ("timestamp", HeaderKind::Timestamp),
            ("validation", HeaderKind::Text),
        ],
        body: BodyRule::Forbidden,
        signer: SignerRule::AccountKey,
        sequence: None,
        consistency: &[Consistency::ValidName("account-id")],
    },
    TypeDescriptor {
        assertion_type: AssertionType::AccountKey,
        name: "account-key",
        primary_key: &["public-key-sha3-384"],
        mandatory: &["account-id", "name", "public-key-sha3-384", "since"],
        headers: &[
            ("account-id", HeaderKind::Text),
            ("name", HeaderKind::Text),
            ("public-key-sha3-384", HeaderKind::Text),
            ("since", HeaderKind::Timestamp),
            ("until", HeaderKind::Timestamp),
        ],
        body: BodyRule::Required,
        signer: SignerRule::AccountKey,
        sequence: None,
        consistency: &[
            Consistency::KeyBodyMatchesId,
            Consistency::AccountExists("account-id"),
        ],
    },
    TypeDescriptor {
        assertion_type: AssertionType::Model,
        name: "model",
        primary_key: &["brand-id", "model"],
        mandatory: &["brand-id", "model", "architecture", "timestamp"],
        headers: &[
            ("architecture", HeaderKind::Text),
            ("brand-id", HeaderKind::Text),
            ("model", HeaderKind::Text),
            ("required-snaps", HeaderKind::List),
            ("timestamp", HeaderKind::Timestamp),
        ],
        body: BodyRule::Optional,
        signer: SignerRule::AccountKey,
        sequence: None,
        consistency: &[
            Consistency::AuthorityMatches("brand-id"),
            Consistency::ValidName("model"),
        ],
    },
    TypeDescriptor {
        assertion_type: AssertionType::Serial,
        name: "serial",
        primary_key: &["brand-id", "model", "serial"],
        mandatory: &[
            "brand-id",
            "model",
            "serial",
            "device-key",
            "device-key-sha3-384",
            "timestamp",
        ],
        headers: &[
            ("brand-id", HeaderKind::Text),
            ("device-key", HeaderKind::Text),
            ("device-key-sha3-384", HeaderKind::Text),
            ("model", HeaderKind::Text),
            ("serial", HeaderKind::Text),
            ("timestamp", HeaderKind::Timestamp),
        ],
        body: BodyRule::Optional,
        signer: SignerRule::AccountKey,
        sequence: None,
        consistency: &[Consistency::DeviceKeyMatchesId, Consistency::ModelExists],
    },
    TypeDescriptor {
        assertion_type: AssertionType::SerialRequest,
        name: "serial-request",
        primary_key: &[],
        mandatory: &["brand-id", "model", "request-id", "device-key"],
        headers: &[
            ("brand-id", HeaderKind::Text),
            ("device-key", HeaderKind::Text),
            ("model", HeaderKind::Text),
            ("request-id", HeaderKind::Text),
            ("serial", HeaderKind::Text),
        ],
        body: BodyRule::Optional,
        signer: SignerRule::SelfSigned("device-key"),
        sequence: None,
        consistency: &[Consistency::AuthorityMatches("brand-id")],
    },
    TypeDescriptor {
        assertion_type: AssertionType::ValidationSet,
        name: "validation-set",
        primary_key: &["account-id", "name", "sequence"],
        mandatory: &["account-id", "name", "sequence", "snaps", "timestamp"],
        headers: &[
            ("account-id", HeaderKind::Text),
            ("name", HeaderKind::Text),
            ("sequence", HeaderKind::Integer),
            ("snaps", HeaderKind::List),
            ("timestamp", HeaderKind::Timestamp),
        ],
        body: BodyRule::Optional,
        signer: SignerRule::AccountKey,
        sequence: Some("sequence"),
        consistency: &[
            Consistency::AuthorityMatches("account-id"),
            Consistency::SequencePositive,
        ],
    },
];

/// Look up the descriptor for a type name
pub fn describe(name: &str) -> Result<&'static TypeDescriptor, ParseError> {
    DESCRIPTORS
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| ParseError::UnknownType(name.to_string()))
}

/// Check a model or account name: alphanumeric runs joined by single hyphens
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
