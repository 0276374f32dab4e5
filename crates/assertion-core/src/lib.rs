//! # Assertion Core
//!
//! Signed assertion documents and the primitives they are built on.
//!
//! ## Key Concepts
//!
//! - **Assertion**: a typed, signed document of headers plus an optional body
//! - **Key ID**: SHA3-384 of a canonical public key; the `sign-key-sha3-384`
//!   header names the key that signed an assertion
//! - **Type Registry**: static descriptors (primary key, mandatory headers,
//!   body rule, signer rule, consistency checks) for every assertion type
//!
//! ## Encoding Guarantees
//!
//! 1. `decode(encode(a)) == a`, byte-for-byte on content and signature
//! 2. Headers are typed at decode time; a value that fails its declared kind
//!    is a `ParseError`, never a silent default
//! 3. The signature covers exactly the bytes returned by `Assertion::content`

pub mod assertion;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod header;
pub mod registry;

pub use assertion::{Assertion, AssertionBuilder, Reference};
pub use crypto::{key_id_of, KeyPair, PublicKey, KEY_ID_LEN};
pub use encoding::MEDIA_TYPE;
pub use error::{AssertionError, ParseError, Result};
pub use header::{HeaderValue, Headers};
pub use registry::{
    describe, is_valid_name, AssertionType, BodyRule, Consistency, HeaderKind, SignerRule,
    TypeDescriptor,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
