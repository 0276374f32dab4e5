//! Environment configuration

use crate::authority::AuthorityConfig;
use crate::error::ServiceError;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::env;
use std::str::FromStr;

/// Device service configuration, read from `DEVICE_SERVICE_*` variables
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub log_level: String,
    /// 32-byte Ed25519 seed of the signing key; generated when absent
    pub key_seed: Option<[u8; 32]>,
    pub authority: AuthorityConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServiceError> {
        let defaults = AuthorityConfig::default();

        let key_seed = match lookup("DEVICE_SERVICE_KEY") {
            Some(encoded) => {
                let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
                    ServiceError::Config(format!("DEVICE_SERVICE_KEY is not base64: {}", e))
                })?;
                let seed: [u8; 32] = bytes.try_into().map_err(|_| {
                    ServiceError::Config("DEVICE_SERVICE_KEY must decode to 32 bytes".into())
                })?;
                Some(seed)
            }
            None => None,
        };

        Ok(Self {
            port: parse(&lookup, "DEVICE_SERVICE_PORT", 8080)?,
            log_level: lookup("DEVICE_SERVICE_LOG_LEVEL").unwrap_or_else(|| "info".into()),
            key_seed,
            authority: AuthorityConfig {
                authority_id: lookup("DEVICE_SERVICE_AUTHORITY_ID")
                    .unwrap_or(defaults.authority_id),
                pending_polls: parse(&lookup, "DEVICE_SERVICE_PENDING_POLLS", defaults.pending_polls)?,
                serial_start: parse(&lookup, "DEVICE_SERVICE_SERIAL_START", defaults.serial_start)?,
                accept_proposed_serials: parse(
                    &lookup,
                    "DEVICE_SERVICE_ACCEPT_PROPOSED_SERIALS",
                    defaults.accept_proposed_serials,
                )?,
                issue_request_ids: parse(
                    &lookup,
                    "DEVICE_SERVICE_REQUEST_IDS",
                    defaults.issue_request_ids,
                )?,
            },
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T, ServiceError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| ServiceError::Config(format!("{} is invalid: {}", name, e))),
        None => Ok(default),
    }
}
