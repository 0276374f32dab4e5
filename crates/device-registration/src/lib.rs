//! # Device Registration
//!
//! Client side of the device registration protocol. A device that holds only
//! its private key and a `model` assertion asks a device service for a
//! request id, sends a self-signed `serial-request`, retries while the service
//! answers "pending", and stores the issued `serial` in the trust database
//! after verifying its chain of trust.
//!
//! ## Protocol
//!
//! - `POST /api/v1/snaps/auth/request-id` → `200 {"request-id": ...}` or `501`
//! - `POST /api/v1/snaps/auth/devices` (serial-request) → `200` serial,
//!   `202` pending, or `400 {"error_list": [{"message": ...}]}`

pub mod client;
pub mod config;
pub mod error;
pub mod transport;
pub mod wire;

pub use client::{FailureReason, RegistrationClient, RegistrationState};
pub use config::{RegistrationConfig, RetryPolicy};
pub use error::{RegistrationError, Result};
pub use transport::{DeviceService, HttpDeviceService, RequestIdReply, SerialReply};
pub use wire::{ErrorEntry, ErrorList, RequestIdResponse, REQUEST_ID_PATH, SERIAL_PATH};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
