//! Talking to the device service
//!
//! `DeviceService` is the seam between the registration state machine and the
//! network: the HTTP implementation lives here, tests script their own.

use crate::config::RegistrationConfig;
use crate::error::{RegistrationError, Result};
use crate::wire::{ErrorList, RequestIdResponse};
use assertion_core::MEDIA_TYPE;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Answer to a request-id call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestIdReply {
    /// `200` with an opaque id
    Issued(String),
    /// `501`: the service does not issue ids (terminal)
    Unsupported,
}

/// Answer to a serial-request submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialReply {
    /// `200` with the encoded serial assertion
    Issued(Vec<u8>),
    /// `202`: still processing, retry later
    Pending,
    /// `400` with the service's message (terminal)
    Rejected(String),
}

/// The remote signing authority
#[async_trait]
pub trait DeviceService: Send + Sync {
    /// Optional capability probe
    async fn probe(&self) -> Result<()>;

    /// Ask for a request id
    async fn request_id(&self) -> Result<RequestIdReply>;

    /// Submit an encoded serial-request
    async fn submit_serial_request(&self, encoded: &[u8]) -> Result<SerialReply>;
}

/// `DeviceService` over HTTP
#[derive(Debug, Clone)]
pub struct HttpDeviceService {
    http_client: reqwest::Client,
    config: RegistrationConfig,
}

impl HttpDeviceService {
    pub fn new(config: &RegistrationConfig) -> Result<Self> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    async fn unexpected(url: String, response: reqwest::Response) -> RegistrationError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        RegistrationError::UnexpectedStatus { status, url, body }
    }
}

#[async_trait]
impl DeviceService for HttpDeviceService {
    async fn probe(&self) -> Result<()> {
        let url = self.config.probe_url();
        let response = self.http_client.head(&url).send().await?;
        debug!(url = %url, status = %response.status(), "Probed device service");
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::unexpected(url, response).await)
        }
    }

    async fn request_id(&self) -> Result<RequestIdReply> {
        let url = self.config.request_id_url();
        let response = self.http_client.post(&url).send().await?;
        debug!(url = %url, status = %response.status(), "Request-id response");

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                let parsed: RequestIdResponse = serde_json::from_slice(&body)?;
                Ok(RequestIdReply::Issued(parsed.request_id))
            }
            StatusCode::NOT_IMPLEMENTED => Ok(RequestIdReply::Unsupported),
            _ => Err(Self::unexpected(url, response).await),
        }
    }

    async fn submit_serial_request(&self, encoded: &[u8]) -> Result<SerialReply> {
        let url = self.config.serial_url();
        let response = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, MEDIA_TYPE)
            .header(ACCEPT, MEDIA_TYPE)
            .body(encoded.to_vec())
            .send()
            .await?;
        debug!(url = %url, status = %response.status(), "Serial-request response");

        match response.status() {
            StatusCode::OK => Ok(SerialReply::Issued(response.bytes().await?.to_vec())),
            StatusCode::ACCEPTED => Ok(SerialReply::Pending),
            StatusCode::BAD_REQUEST => {
                let body = response.bytes().await?;
                let message = match serde_json::from_slice::<ErrorList>(&body) {
                    Ok(errors) if !errors.error_list.is_empty() => errors.message(),
                    _ => String::from_utf8_lossy(&body).trim().to_string(),
                };
                Ok(SerialReply::Rejected(message))
            }
            _ => Err(Self::unexpected(url, response).await),
        }
    }
}
