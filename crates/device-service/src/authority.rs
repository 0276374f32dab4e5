//! Serial authority
//!
//! Issues request ids and turns valid serial-requests into signed serial
//! assertions. The ledger makes submissions idempotent: a device key that
//! already holds a serial for a brand/model gets the same assertion back.
//! A request id is consumed by the serial it produces; at most
//! `MAX_OUTSTANDING_REQUEST_IDS` unused ids are kept, oldest evicted first.

use crate::error::ServiceError;
use assertion_core::{Assertion, AssertionType, KeyPair};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

/// Policy knobs of the authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    /// `authority-id` of issued serials
    pub authority_id: String,
    /// `202` answers given per request id before a serial is issued
    pub pending_polls: u32,
    /// Serial numbers are `serial_start + submissions received`
    pub serial_start: u64,
    /// Honour a serial proposed by the device
    pub accept_proposed_serials: bool,
    /// Answer the request-id endpoint (`501` otherwise)
    pub issue_request_ids: bool,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            authority_id: "canonical".into(),
            pending_polls: 0,
            serial_start: 9999,
            accept_proposed_serials: false,
            issue_request_ids: true,
        }
    }
}

/// Unused request ids kept before the oldest is evicted
pub const MAX_OUTSTANDING_REQUEST_IDS: usize = 10_000;

/// Result of a serial-request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialOutcome {
    Issued(Assertion),
    Pending,
}

/// (brand-id, model, device key id)
type DeviceRef = (String, String, String);
/// (brand-id, model, serial)
type SerialRef = (String, String, String);

#[derive(Debug, Default)]
struct OutstandingRequest {
    /// Issue order, for eviction
    issued: u64,
    /// `202` answers given so far
    polls: u32,
}

#[derive(Debug, Default)]
struct Ledger {
    request_ids: HashMap<String, OutstandingRequest>,
    request_ids_issued: u64,
    issued: HashMap<DeviceRef, Assertion>,
    taken: HashMap<SerialRef, String>,
    submissions: u64,
}

/// Signing authority behind the device service
#[derive(Debug)]
pub struct SerialAuthority {
    key: KeyPair,
    config: AuthorityConfig,
    ledger: Mutex<Ledger>,
}

impl SerialAuthority {
    pub fn new(key: KeyPair, config: AuthorityConfig) -> Self {
        info!(
            authority = %config.authority_id,
            key_id = %key.key_id(),
            pending_polls = config.pending_polls,
            accept_proposed_serials = config.accept_proposed_serials,
            "Serial authority initialized"
        );
        Self {
            key,
            config,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    fn ledger(&self) -> Result<std::sync::MutexGuard<'_, Ledger>, ServiceError> {
        self.ledger
            .lock()
            .map_err(|_| ServiceError::Internal("ledger lock poisoned".into()))
    }

    /// Hand out a fresh request id
    pub fn issue_request_id(&self) -> Result<String, ServiceError> {
        if !self.config.issue_request_ids {
            return Err(ServiceError::RequestIdsDisabled);
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut ledger = self.ledger()?;
        if ledger.request_ids.len() >= MAX_OUTSTANDING_REQUEST_IDS {
            let oldest = ledger
                .request_ids
                .iter()
                .min_by_key(|(_, outstanding)| outstanding.issued)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                ledger.request_ids.remove(&oldest);
                warn!(request_id = %oldest, "Evicted unused request id");
            }
        }
        ledger.request_ids_issued += 1;
        let issued = ledger.request_ids_issued;
        ledger
            .request_ids
            .insert(request_id.clone(), OutstandingRequest { issued, polls: 0 });
        info!(request_id = %request_id, "Issued request id");
        Ok(request_id)
    }

    /// Process an encoded serial-request
    pub fn process(&self, body: &[u8]) -> Result<SerialOutcome, ServiceError> {
        let request = Assertion::decode(body)
            .map_err(|e| ServiceError::BadRequest(format!("cannot decode serial-request: {}", e)))?;
        if request.assertion_type() != AssertionType::SerialRequest {
            return Err(ServiceError::BadRequest(format!(
                "expected a serial-request, got {}",
                request.assertion_type()
            )));
        }
        let device_key = request
            .verify_self_signed()
            .map_err(|e| ServiceError::BadRequest(format!("invalid serial-request: {}", e)))?;

        let brand_id = request.header_str("brand-id").unwrap_or_default().to_string();
        let model = request.header_str("model").unwrap_or_default().to_string();
        if request.authority_id() != brand_id {
            return Err(ServiceError::BadRequest(format!(
                "authority-id {} does not match brand-id {}",
                request.authority_id(),
                brand_id
            )));
        }
        let request_id = request.header_str("request-id").unwrap_or_default();
        let device = (brand_id.clone(), model.clone(), device_key.key_id().to_string());

        let mut ledger = self.ledger()?;
        ledger.submissions = ledger.submissions.saturating_add(1);

        if let Some(serial) = ledger.issued.get(&device) {
            info!(reference = %serial.reference(), "Re-sending serial for known device");
            return Ok(SerialOutcome::Issued(serial.clone()));
        }

        let outstanding = ledger.request_ids.get_mut(request_id).ok_or_else(|| {
            ServiceError::BadRequest(format!("unknown or already used request-id {:?}", request_id))
        })?;
        if outstanding.polls < self.config.pending_polls {
            outstanding.polls += 1;
            info!(request_id = %request_id, poll = outstanding.polls, "Serial-request pending");
            return Ok(SerialOutcome::Pending);
        }

        let serial = match request.header_str("serial") {
            Some(proposed) if self.config.accept_proposed_serials => {
                let key = (brand_id.clone(), model.clone(), proposed.to_string());
                if ledger.taken.contains_key(&key) {
                    warn!(serial = %proposed, "Proposed serial already assigned");
                    return Err(ServiceError::BadRequest(format!(
                        "serial {} is already assigned to another device",
                        proposed
                    )));
                }
                proposed.to_string()
            }
            proposed => {
                if let Some(proposed) = proposed {
                    info!(serial = %proposed, "Ignoring proposed serial");
                }
                let overflow = || ServiceError::Internal("serial numbers exhausted".into());
                let mut number = self
                    .config
                    .serial_start
                    .checked_add(ledger.submissions)
                    .ok_or_else(overflow)?;
                while ledger
                    .taken
                    .contains_key(&(brand_id.clone(), model.clone(), number.to_string()))
                {
                    number = number.checked_add(1).ok_or_else(overflow)?;
                }
                number.to_string()
            }
        };

        let mut builder = Assertion::builder(AssertionType::Serial)
            .authority(self.config.authority_id.as_str())
            .header("brand-id", brand_id.as_str())
            .header("model", model.as_str())
            .header("serial", serial.as_str())
            .header("device-key", request.header_str("device-key").unwrap_or_default())
            .header("device-key-sha3-384", device_key.key_id())
            .timestamp("timestamp", Utc::now());
        if !request.body().is_empty() {
            builder = builder.body(request.body().to_vec());
        }
        let issued = builder.sign(&self.key)?;

        ledger.request_ids.remove(request_id);
        ledger
            .taken
            .insert((brand_id, model, serial), device.2.clone());
        ledger.issued.insert(device, issued.clone());
        info!(reference = %issued.reference(), "Issued serial");
        Ok(SerialOutcome::Issued(issued))
    }
}
