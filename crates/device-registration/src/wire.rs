//! Wire types shared by the client and the device service

use serde::{Deserialize, Serialize};

/// Endpoint issuing request ids
pub const REQUEST_ID_PATH: &str = "/api/v1/snaps/auth/request-id";

/// Endpoint accepting serial-requests
pub const SERIAL_PATH: &str = "/api/v1/snaps/auth/devices";

/// `200` body of the request-id endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdResponse {
    #[serde(rename = "request-id")]
    pub request_id: String,
}

/// `400` body of the serial endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorList {
    pub error_list: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorList {
    /// A list holding one message
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            error_list: vec![ErrorEntry {
                message: message.into(),
                code: None,
            }],
        }
    }

    /// All messages joined, in the service's own wording
    pub fn message(&self) -> String {
        self.error_list
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_wire_name() {
        let parsed: RequestIdResponse = serde_json::from_str(r#"{"request-id": "REQ-1"}"#).unwrap();
        assert_eq!(parsed.request_id, "REQ-1");
    }

    #[test]
    fn test_error_list_message() {
        let parsed: ErrorList =
            serde_json::from_str(r#"{"error_list":[{"message":"bad serial-request"}]}"#).unwrap();
        assert_eq!(parsed.message(), "bad serial-request");
        assert_eq!(
            serde_json::to_string(&ErrorList::single("bad serial-request")).unwrap(),
            r#"{"error_list":[{"message":"bad serial-request"}]}"#
        );
    }
}
