//! Device Service
//!
//! Reference signing authority for the device registration protocol. It
//! issues request ids and answers serial-requests with signed `serial`
//! assertions, optionally keeping devices waiting with `202` first.
//!
//! ## API Endpoints
//!
//! - `HEAD /` - Capability probe
//! - `POST /api/v1/snaps/auth/request-id` - Issue a request id (`501` when disabled)
//! - `POST /api/v1/snaps/auth/devices` - Submit a serial-request

pub mod api;
pub mod authority;
pub mod config;
pub mod error;

pub use api::{create_router, AppState};
pub use authority::{AuthorityConfig, SerialAuthority, SerialOutcome};
pub use config::ServiceConfig;
pub use error::ServiceError;
