//! Typed header values

use std::collections::BTreeMap;

/// Assertion headers, kept in canonical (byte-wise ascending) order
///
/// The `type` header is not part of the map; it is carried by the
/// assertion itself.
pub type Headers = BTreeMap<String, HeaderValue>;

/// A typed header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// Single-line string (also used for timestamps)
    Text(String),
    /// Non-negative integer
    Integer(u64),
    /// List of strings
    List(Vec<String>),
}

impl HeaderValue {
    /// Get the value as a string, if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            HeaderValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the value as a list
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            HeaderValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Scalar rendering used for primary keys and header filters
    pub fn to_scalar(&self) -> Option<String> {
        match self {
            HeaderValue::Text(s) => Some(s.clone()),
            HeaderValue::Integer(n) => Some(n.to_string()),
            HeaderValue::List(_) => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<&String> for HeaderValue {
    fn from(value: &String) -> Self {
        HeaderValue::Text(value.clone())
    }
}

impl From<u64> for HeaderValue {
    fn from(value: u64) -> Self {
        HeaderValue::Integer(value)
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(items: Vec<String>) -> Self {
        HeaderValue::List(items)
    }
}

impl From<Vec<&str>> for HeaderValue {
    fn from(items: Vec<&str>) -> Self {
        HeaderValue::List(items.into_iter().map(String::from).collect())
    }
}
