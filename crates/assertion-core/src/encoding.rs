//! Text encoding of assertions
//!
//! ```text
//! type: serial
//! authority-id: canonical
//! body-length: 11
//! brand-id: acme
//! ...
//! sign-key-sha3-384: <key id>
//!
//! <body>
//!
//! <signature>
//! ```
//!
//! The header block starts with `type`, followed by every other header in
//! strictly ascending byte order. The body (if any) follows a blank line and
//! is exactly `body-length` bytes. The signature block follows another blank
//! line and is opaque to this layer. The signed content is everything up to
//! the separator before the signature.

use crate::assertion::Assertion;
use crate::error::ParseError;
use crate::header::{HeaderValue, Headers};
use crate::registry::{self, AssertionType, BodyRule, HeaderKind, TypeDescriptor, BODY_LENGTH, TYPE};
use std::fmt::Write;

/// Media type used when assertions travel over HTTP
pub const MEDIA_TYPE: &str = "application/x.ubuntu.assertion";

/// Separator between header block, body and signature
pub(crate) const SEPARATOR: &[u8] = b"\n\n";

/// Prefix of a list item line
const LIST_ITEM: &str = "  - ";

/// Raw header value before typing
enum RawValue<'a> {
    Scalar(&'a str),
    List(Vec<&'a str>),
}

/// Render the signed content of an assertion: header block plus body
pub(crate) fn encode_content(
    assertion_type: AssertionType,
    headers: &Headers,
    body: &[u8],
) -> Vec<u8> {
    let mut block = format!("{}: {}", TYPE, assertion_type.name());
    for (name, value) in headers {
        match value {
            HeaderValue::Text(text) => {
                let _ = write!(block, "\n{}: {}", name, text);
            }
            HeaderValue::Integer(n) => {
                let _ = write!(block, "\n{}: {}", name, n);
            }
            HeaderValue::List(items) => {
                let _ = write!(block, "\n{}:", name);
                for item in items {
                    let _ = write!(block, "\n{}{}", LIST_ITEM, item);
                }
            }
        }
    }

    let mut content = block.into_bytes();
    if !body.is_empty() {
        content.extend_from_slice(SEPARATOR);
        content.extend_from_slice(body);
    }
    content
}

/// Decode an assertion from its text encoding
pub fn decode(data: &[u8]) -> Result<Assertion, ParseError> {
    let header_end = find_separator(data).ok_or(ParseError::MissingSignature)?;
    let header_text = std::str::from_utf8(&data[..header_end]).map_err(|_| ParseError::InvalidUtf8)?;
    let (assertion_type, headers) = parse_header_block(header_text)?;
    let descriptor = assertion_type.descriptor();

    let body_length = match headers.get(BODY_LENGTH) {
        Some(HeaderValue::Integer(0)) => {
            return Err(ParseError::MalformedValue {
                header: BODY_LENGTH.into(),
                reason: "must be omitted when the body is empty".into(),
            })
        }
        Some(HeaderValue::Integer(n)) => usize::try_from(*n).map_err(|_| ParseError::MalformedValue {
            header: BODY_LENGTH.into(),
            reason: "too large".into(),
        })?,
        Some(_) => {
            return Err(ParseError::MalformedValue {
                header: BODY_LENGTH.into(),
                reason: "expected an integer".into(),
            })
        }
        None => 0,
    };

    let after_headers = header_end + SEPARATOR.len();
    let (body, content_end, signature_start) = if body_length == 0 {
        // Without body-length everything after the headers is the signature
        if find_separator(&data[after_headers..]).is_some() {
            return Err(ParseError::BodyLengthMismatch {
                declared: 0,
                available: data.len() - after_headers,
            });
        }
        (Vec::new(), header_end, after_headers)
    } else {
        let available = data.len().saturating_sub(after_headers);
        let body_end = after_headers.saturating_add(body_length);
        let separator_end = body_end.saturating_add(SEPARATOR.len());
        if separator_end > data.len() || &data[body_end..separator_end] != SEPARATOR {
            return Err(ParseError::BodyLengthMismatch {
                declared: body_length,
                available,
            });
        }
        (data[after_headers..body_end].to_vec(), body_end, separator_end)
    };

    let signature = &data[signature_start..];
    if signature.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ParseError::MissingSignature);
    }
    if let Some(b) = signature.iter().find(|b| !is_base64_byte(**b)) {
        return Err(ParseError::MalformedSignature(format!(
            "unexpected byte {:#04x}",
            b
        )));
    }

    check_descriptor(descriptor, &headers, &body)?;

    Ok(Assertion::from_parts(
        assertion_type,
        headers,
        body,
        data[..content_end].to_vec(),
        signature.to_vec(),
    ))
}

fn find_separator(data: &[u8]) -> Option<usize> {
    data.windows(SEPARATOR.len()).position(|w| w == SEPARATOR)
}

fn parse_header_block(text: &str) -> Result<(AssertionType, Headers), ParseError> {
    let mut lines = text.split('\n').enumerate().peekable();

    let assertion_type = match lines.next() {
        Some((_, line)) => match line.strip_prefix("type: ") {
            Some(name) => registry::describe(name)?.assertion_type,
            None => return Err(ParseError::MissingType),
        },
        None => return Err(ParseError::MissingType),
    };
    let descriptor = assertion_type.descriptor();

    let mut headers = Headers::new();
    let mut previous: Option<&str> = None;

    while let Some((index, line)) = lines.next() {
        let line_no = index + 1;
        let (name, rest) = line.split_once(':').ok_or_else(|| ParseError::MalformedHeader {
            line: line_no,
            reason: "expected 'name: value'".into(),
        })?;

        if !is_valid_header_name(name) {
            return Err(ParseError::MalformedHeader {
                line: line_no,
                reason: format!("invalid header name {:?}", name),
            });
        }
        if name == TYPE || headers.contains_key(name) {
            return Err(ParseError::DuplicateHeader(name.to_string()));
        }
        if let Some(prev) = previous {
            if name < prev {
                return Err(ParseError::NonCanonicalOrder {
                    header: name.to_string(),
                });
            }
        }

        let raw = if rest.is_empty() {
            let mut items = Vec::new();
            while let Some((_, item_line)) = lines.peek() {
                match item_line.strip_prefix(LIST_ITEM) {
                    Some(item) => {
                        items.push(item);
                        lines.next();
                    }
                    None => break,
                }
            }
            if items.is_empty() {
                return Err(ParseError::MalformedValue {
                    header: name.to_string(),
                    reason: "empty value".into(),
                });
            }
            if items.iter().any(|item| !is_clean_value(item)) {
                return Err(ParseError::MalformedValue {
                    header: name.to_string(),
                    reason: "list items must be non-empty without surrounding whitespace".into(),
                });
            }
            RawValue::List(items)
        } else {
            match rest.strip_prefix(' ') {
                Some(value) if is_clean_value(value) => RawValue::Scalar(value),
                Some(_) => {
                    return Err(ParseError::MalformedValue {
                        header: name.to_string(),
                        reason: "value must be non-empty without surrounding whitespace".into(),
                    })
                }
                None => {
                    return Err(ParseError::MalformedHeader {
                        line: line_no,
                        reason: "expected a space after ':'".into(),
                    })
                }
            }
        };

        let value = type_value(descriptor, name, raw)?;
        headers.insert(name.to_string(), value);
        previous = Some(name);
    }

    Ok((assertion_type, headers))
}

fn type_value(
    descriptor: &TypeDescriptor,
    name: &str,
    raw: RawValue<'_>,
) -> Result<HeaderValue, ParseError> {
    let malformed = |reason: &str| ParseError::MalformedValue {
        header: name.to_string(),
        reason: reason.to_string(),
    };

    match (descriptor.header_kind(name), raw) {
        (Some(HeaderKind::List) | None, RawValue::List(items)) => Ok(HeaderValue::List(
            items.into_iter().map(String::from).collect(),
        )),
        (Some(_), RawValue::List(_)) => Err(malformed("expected a single value, found a list")),
        (Some(HeaderKind::List), RawValue::Scalar(_)) => Err(malformed("expected a list")),
        (Some(HeaderKind::Integer), RawValue::Scalar(value)) => {
            parse_integer(value).map(HeaderValue::Integer).ok_or_else(|| {
                malformed("expected a non-negative integer without leading zeros")
            })
        }
        (Some(HeaderKind::Timestamp), RawValue::Scalar(value)) => {
            chrono::DateTime::parse_from_rfc3339(value)
                .map_err(|e| malformed(&format!("expected an RFC 3339 timestamp: {}", e)))?;
            Ok(HeaderValue::Text(value.to_string()))
        }
        (Some(HeaderKind::Text) | None, RawValue::Scalar(value)) => {
            Ok(HeaderValue::Text(value.to_string()))
        }
    }
}

fn check_descriptor(
    descriptor: &TypeDescriptor,
    headers: &Headers,
    body: &[u8],
) -> Result<(), ParseError> {
    for header in descriptor.mandatory_headers() {
        if !headers.contains_key(header) {
            return Err(ParseError::MissingHeader {
                assertion_type: descriptor.name.to_string(),
                header: header.to_string(),
            });
        }
    }

    match descriptor.body {
        BodyRule::Forbidden if !body.is_empty() => {
            Err(ParseError::UnexpectedBody(descriptor.name.to_string()))
        }
        BodyRule::Required if body.is_empty() => {
            Err(ParseError::MissingBody(descriptor.name.to_string()))
        }
        _ => Ok(()),
    }
}

fn parse_integer(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if value.len() > 1 && value.starts_with('0') {
        return None;
    }
    value.parse().ok()
}

fn is_valid_header_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')
}

fn is_clean_value(value: &str) -> bool {
    !value.is_empty() && value.trim() == value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn signed_account(key: &KeyPair) -> Assertion {
        Assertion::builder(AssertionType::Account)
            .authority("canonical")
            .header("account-id", "acme")
            .header("display-name", "Acme Corp")
            .header("validation", "verified")
            .header("timestamp", "2024-01-01T00:00:00Z")
            .sign(key)
            .unwrap()
    }

    fn replace(encoded: &[u8], from: &str, to: &str) -> Vec<u8> {
        String::from_utf8(encoded.to_vec())
            .unwrap()
            .replacen(from, to, 1)
            .into_bytes()
    }

    #[test]
    fn test_header_block_is_canonical() {
        let key = KeyPair::generate();
        let account = signed_account(&key);
        let text = String::from_utf8(account.content().to_vec()).unwrap();
        let names: Vec<&str> = text
            .lines()
            .map(|l| l.split(':').next().unwrap())
            .collect();

        assert_eq!(names[0], "type");
        let mut sorted = names[1..].to_vec();
        sorted.sort();
        assert_eq!(names[1..], sorted[..]);
    }

    #[test]
    fn test_encode_decode_is_byte_identical() {
        let key = KeyPair::generate();
        let account = signed_account(&key);
        let encoded = account.encode();

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.encode(), encoded);
        assert_eq!(decoded, account);
    }

    #[test]
    fn test_missing_signature() {
        let key = KeyPair::generate();
        let mut content = signed_account(&key).content().to_vec();
        assert_eq!(decode(&content).unwrap_err(), ParseError::MissingSignature);

        content.extend_from_slice(b"\n\n");
        assert_eq!(decode(&content).unwrap_err(), ParseError::MissingSignature);
    }

    #[test]
    fn test_missing_mandatory_header() {
        let key = KeyPair::generate();
        let encoded = signed_account(&key).encode();
        let broken = replace(&encoded, "display-name: Acme Corp\n", "");

        assert_eq!(
            decode(&broken).unwrap_err(),
            ParseError::MissingHeader {
                assertion_type: "account".into(),
                header: "display-name".into(),
            }
        );
    }

    #[test]
    fn test_malformed_integer() {
        let key = KeyPair::generate();
        let account = Assertion::builder(AssertionType::Account)
            .authority("canonical")
            .header("account-id", "acme")
            .header("display-name", "Acme")
            .header("validation", "verified")
            .header("timestamp", "2024-01-01T00:00:00Z")
            .revision(7)
            .sign(&key)
            .unwrap();
        let broken = replace(&account.encode(), "revision: 7", "revision: 07");

        assert!(matches!(
            decode(&broken).unwrap_err(),
            ParseError::MalformedValue { header, .. } if header == "revision"
        ));
    }

    #[test]
    fn test_malformed_timestamp() {
        let key = KeyPair::generate();
        let encoded = signed_account(&key).encode();
        let broken = replace(&encoded, "2024-01-01T00:00:00Z", "yesterday");

        assert!(matches!(
            decode(&broken).unwrap_err(),
            ParseError::MalformedValue { header, .. } if header == "timestamp"
        ));
    }

    #[test]
    fn test_unknown_type() {
        let data = b"type: snap-revision\nauthority-id: canonical\n\nc2ln";
        assert_eq!(
            decode(data).unwrap_err(),
            ParseError::UnknownType("snap-revision".into())
        );
    }

    #[test]
    fn test_type_must_come_first() {
        let data = b"authority-id: canonical\ntype: account\n\nc2ln";
        assert_eq!(decode(data).unwrap_err(), ParseError::MissingType);
    }

    #[test]
    fn test_non_canonical_order_rejected() {
        let key = KeyPair::generate();
        let encoded = signed_account(&key).encode();
        let broken = replace(
            &encoded,
            "account-id: acme\nauthority-id: canonical",
            "authority-id: canonical\naccount-id: acme",
        );

        assert_eq!(
            decode(&broken).unwrap_err(),
            ParseError::NonCanonicalOrder {
                header: "account-id".into()
            }
        );
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let key = KeyPair::generate();
        let encoded = signed_account(&key).encode();
        let broken = replace(&encoded, "account-id: acme", "account-id: acme\naccount-id: acme");

        assert_eq!(
            decode(&broken).unwrap_err(),
            ParseError::DuplicateHeader("account-id".into())
        );
    }

    #[test]
    fn test_body_length_mismatch() {
        let key = KeyPair::generate();
        let model = Assertion::builder(AssertionType::Model)
            .authority("acme")
            .header("brand-id", "acme")
            .header("model", "widget")
            .header("architecture", "amd64")
            .header("timestamp", "2024-01-01T00:00:00Z")
            .body("gadget defaults")
            .sign(&key)
            .unwrap();
        let encoded = model.encode();

        let longer = replace(&encoded, "body-length: 15", "body-length: 16");
        assert!(matches!(
            decode(&longer).unwrap_err(),
            ParseError::BodyLengthMismatch { declared: 16, .. }
        ));

        let truncated = &encoded[..model.content().len() - 3];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn test_forbidden_body() {
        let key = KeyPair::generate();
        let result = Assertion::builder(AssertionType::Account)
            .authority("canonical")
            .header("account-id", "acme")
            .header("display-name", "Acme")
            .header("validation", "verified")
            .header("timestamp", "2024-01-01T00:00:00Z")
            .body("not allowed")
            .sign(&key);

        assert!(result.is_err());
    }

    #[test]
    fn test_list_header_roundtrip() {
        let key = KeyPair::generate();
        let model = Assertion::builder(AssertionType::Model)
            .authority("acme")
            .header("brand-id", "acme")
            .header("model", "widget")
            .header("architecture", "arm64")
            .header("required-snaps", vec!["core22", "widget-kernel"])
            .header("timestamp", "2024-01-01T00:00:00Z")
            .sign(&key)
            .unwrap();

        let text = String::from_utf8(model.content().to_vec()).unwrap();
        assert!(text.contains("required-snaps:\n  - core22\n  - widget-kernel"));

        let decoded = decode(&model.encode()).unwrap();
        assert_eq!(
            decoded.header_list("required-snaps").unwrap(),
            &["core22".to_string(), "widget-kernel".to_string()]
        );
    }

    #[test]
    fn test_scalar_where_list_declared() {
        let key = KeyPair::generate();
        let model = Assertion::builder(AssertionType::Model)
            .authority("acme")
            .header("brand-id", "acme")
            .header("model", "widget")
            .header("architecture", "arm64")
            .header("required-snaps", vec!["core22"])
            .header("timestamp", "2024-01-01T00:00:00Z")
            .sign(&key)
            .unwrap();
        let broken = replace(&model.encode(), "required-snaps:\n  - core22", "required-snaps: core22");

        assert!(matches!(
            decode(&broken).unwrap_err(),
            ParseError::MalformedValue { header, .. } if header == "required-snaps"
        ));
    }

    #[test]
    fn test_list_rejected_for_primary_key_header() {
        let key = KeyPair::generate();
        let device = KeyPair::generate();
        let serial = Assertion::builder(AssertionType::Serial)
            .authority("canonical")
            .header("brand-id", "acme")
            .header("model", "widget")
            .header("serial", "10001")
            .header("device-key", device.public_key().encode())
            .header("device-key-sha3-384", device.key_id())
            .header("timestamp", "2024-01-01T00:00:00Z")
            .sign(&key)
            .unwrap();
        let broken = replace(&serial.encode(), "serial: 10001", "serial:\n  - 10001\n  - 10002");

        assert!(matches!(
            decode(&broken).unwrap_err(),
            ParseError::MalformedValue { header, .. } if header == "serial"
        ));
    }

    #[test]
    fn test_body_without_body_length_rejected() {
        let key = KeyPair::generate();
        let model = Assertion::builder(AssertionType::Model)
            .authority("acme")
            .header("brand-id", "acme")
            .header("model", "widget")
            .header("architecture", "amd64")
            .header("timestamp", "2024-01-01T00:00:00Z")
            .body("gadget defaults")
            .sign(&key)
            .unwrap();
        let broken = replace(&model.encode(), "body-length: 15\n", "");

        assert!(matches!(
            decode(&broken).unwrap_err(),
            ParseError::BodyLengthMismatch { declared: 0, .. }
        ));
    }

    #[test]
    fn test_signature_block_must_be_base64() {
        let key = KeyPair::generate();
        let mut encoded = signed_account(&key).encode();
        encoded.extend_from_slice(b" trailing words");

        assert!(matches!(
            decode(&encoded).unwrap_err(),
            ParseError::MalformedSignature(_)
        ));
    }

    #[test]
    fn test_integer_parsing() {
        assert_eq!(parse_integer("0"), Some(0));
        assert_eq!(parse_integer("10001"), Some(10001));
        assert_eq!(parse_integer("00"), None);
        assert_eq!(parse_integer("-1"), None);
        assert_eq!(parse_integer("1e3"), None);
        assert_eq!(parse_integer("99999999999999999999999"), None);
    }
}
