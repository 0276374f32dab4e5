//! Registration state machine
//!
//! ```text
//! Init --request-id--> RequestIdObtained --sign--> Submitting
//! Submitting --200--> Done
//! Submitting --202--> Pending --(wait)--> Submitting (same bytes)
//! Submitting --400--> Failed(Terminal)
//! Pending (attempts spent) --> Failed(Timeout)
//! ```
//!
//! The client never spawns work. Callers drive it with [`RegistrationClient::step`]
//! and [`RegistrationClient::wait`], or hand the whole loop to
//! [`RegistrationClient::run`].

use crate::config::RegistrationConfig;
use crate::error::{RegistrationError, Result};
use crate::transport::{DeviceService, RequestIdReply, SerialReply};
use assertion_core::{Assertion, AssertionType, KeyPair};
use assertion_db::TrustDatabase;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a registration failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Refused by the service, with its message
    Terminal(String),
    /// Still pending when every retry was spent
    Timeout { attempts: u32 },
    /// A serial was issued but could not be accepted
    InvalidSerial(String),
}

/// Registration progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    Init,
    RequestIdObtained { request_id: String },
    /// About to submit `request` (attempt numbers start at 1)
    Submitting { request: Vec<u8>, attempt: u32 },
    /// Submission `attempt` was answered with "pending"
    Pending { request: Vec<u8>, attempt: u32 },
    Done { serial: Assertion },
    Failed(FailureReason),
    Cancelled,
}

impl RegistrationState {
    pub fn name(&self) -> &'static str {
        match self {
            RegistrationState::Init => "init",
            RegistrationState::RequestIdObtained { .. } => "request-id-obtained",
            RegistrationState::Submitting { .. } => "submitting",
            RegistrationState::Pending { .. } => "pending",
            RegistrationState::Done { .. } => "done",
            RegistrationState::Failed(_) => "failed",
            RegistrationState::Cancelled => "cancelled",
        }
    }

    /// Whether no further step can change the state
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            RegistrationState::Done { .. }
                | RegistrationState::Failed(_)
                | RegistrationState::Cancelled
        )
    }
}

/// Obtains a serial assertion for one device
#[derive(Debug)]
pub struct RegistrationClient {
    config: RegistrationConfig,
    device_key: KeyPair,
    brand_id: String,
    model: String,
    probed: bool,
    state: RegistrationState,
}

impl RegistrationClient {
    /// Create a client for a device holding `device_key`, registering as `model`
    pub fn new(config: RegistrationConfig, device_key: KeyPair, model: &Assertion) -> Result<Self> {
        config.validate()?;
        if model.assertion_type() != AssertionType::Model {
            return Err(RegistrationError::Config(format!(
                "expected a model assertion, got {}",
                model.assertion_type()
            )));
        }
        let brand_id = model.header_str("brand-id").unwrap_or_default().to_string();
        let model_name = model.header_str("model").unwrap_or_default().to_string();

        Ok(Self {
            config,
            device_key,
            brand_id,
            model: model_name,
            probed: false,
            state: RegistrationState::Init,
        })
    }

    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    fn transition(&mut self, next: RegistrationState) {
        info!(
            brand = %self.brand_id,
            model = %self.model,
            from = self.state.name(),
            to = next.name(),
            "Registration state change"
        );
        self.state = next;
    }

    /// Advance by one transition
    ///
    /// Transport errors leave the state unchanged so the step can be retried.
    /// A serial that fails validation moves to `Failed(InvalidSerial)` and the
    /// underlying error is returned.
    pub async fn step(
        &mut self,
        service: &dyn DeviceService,
        db: &TrustDatabase,
    ) -> Result<&RegistrationState> {
        match self.state.clone() {
            RegistrationState::Init => {
                if self.config.probe && !self.probed {
                    service.probe().await?;
                    self.probed = true;
                    return Ok(&self.state);
                }
                match service.request_id().await? {
                    RequestIdReply::Issued(request_id) => {
                        self.transition(RegistrationState::RequestIdObtained { request_id })
                    }
                    RequestIdReply::Unsupported => self.transition(RegistrationState::Failed(
                        FailureReason::Terminal("device service does not issue request ids".into()),
                    )),
                }
            }
            RegistrationState::RequestIdObtained { request_id } => {
                let request = self.build_serial_request(&request_id)?;
                self.transition(RegistrationState::Submitting {
                    request,
                    attempt: 1,
                });
            }
            RegistrationState::Submitting { request, attempt } => {
                match service.submit_serial_request(&request).await? {
                    SerialReply::Issued(bytes) => match self.accept_serial(&bytes, db).await {
                        Ok(serial) => self.transition(RegistrationState::Done { serial }),
                        Err(e) => {
                            warn!(error = %e, "Issued serial rejected");
                            self.transition(RegistrationState::Failed(
                                FailureReason::InvalidSerial(e.to_string()),
                            ));
                            return Err(e);
                        }
                    },
                    SerialReply::Pending => {
                        self.transition(RegistrationState::Pending { request, attempt })
                    }
                    SerialReply::Rejected(message) => {
                        warn!(message = %message, "Serial-request refused");
                        self.transition(RegistrationState::Failed(FailureReason::Terminal(
                            message,
                        )))
                    }
                }
            }
            RegistrationState::Pending { request, attempt } => {
                if attempt >= self.config.retry.max_attempts {
                    self.transition(RegistrationState::Failed(FailureReason::Timeout {
                        attempts: attempt,
                    }));
                } else {
                    self.transition(RegistrationState::Submitting {
                        request,
                        attempt: attempt + 1,
                    });
                }
            }
            RegistrationState::Done { .. }
            | RegistrationState::Failed(_)
            | RegistrationState::Cancelled => {}
        }
        Ok(&self.state)
    }

    /// Sleep out the backoff of a pending submission
    ///
    /// Returns immediately outside `Pending`. Cancellation, or reaching
    /// `deadline` before the backoff ends, moves to `Cancelled`.
    pub async fn wait(
        &mut self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let attempt = match &self.state {
            RegistrationState::Pending { attempt, .. } => *attempt,
            _ => return Ok(()),
        };
        if attempt >= self.config.retry.max_attempts {
            return Ok(());
        }

        let wake = Instant::now() + self.config.retry.backoff(attempt);
        let (until, hits_deadline) = match deadline {
            Some(deadline) if deadline < wake => (deadline, true),
            _ => (wake, false),
        };

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep_until(until) => {
                if !hits_deadline {
                    return Ok(());
                }
            }
        }

        self.transition(RegistrationState::Cancelled);
        Err(RegistrationError::Cancelled)
    }

    /// Drive the state machine to a final state
    pub async fn run(
        &mut self,
        service: &dyn DeviceService,
        db: &TrustDatabase,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Assertion> {
        loop {
            match self.step(service, db).await? {
                RegistrationState::Done { serial } => return Ok(serial.clone()),
                RegistrationState::Failed(FailureReason::Terminal(message)) => {
                    return Err(RegistrationError::Terminal(message.clone()))
                }
                RegistrationState::Failed(FailureReason::Timeout { attempts }) => {
                    return Err(RegistrationError::Timeout {
                        attempts: *attempts,
                    })
                }
                RegistrationState::Failed(FailureReason::InvalidSerial(reason)) => {
                    return Err(RegistrationError::ConsistencyViolation(reason.clone()))
                }
                RegistrationState::Cancelled => return Err(RegistrationError::Cancelled),
                RegistrationState::Pending { .. } => self.wait(cancel, deadline).await?,
                _ => {}
            }
        }
    }

    fn build_serial_request(&self, request_id: &str) -> Result<Vec<u8>> {
        let mut builder = Assertion::builder(AssertionType::SerialRequest)
            .authority(self.brand_id.as_str())
            .header("brand-id", self.brand_id.as_str())
            .header("model", self.model.as_str())
            .header("request-id", request_id)
            .header("device-key", self.device_key.public_key().encode());
        if let Some(serial) = &self.config.proposed_serial {
            builder = builder.header("serial", serial.as_str());
        }
        let request = builder.sign(&self.device_key)?;
        Ok(request.encode())
    }

    async fn accept_serial(&self, bytes: &[u8], db: &TrustDatabase) -> Result<Assertion> {
        let serial = Assertion::decode(bytes)?;
        if serial.assertion_type() != AssertionType::Serial {
            return Err(RegistrationError::ConsistencyViolation(format!(
                "expected a serial assertion, got {}",
                serial.assertion_type()
            )));
        }

        let expect = |header: &str, wanted: &str| -> Result<()> {
            let actual = serial.header_str(header).unwrap_or_default();
            if actual == wanted {
                Ok(())
            } else {
                Err(RegistrationError::ConsistencyViolation(format!(
                    "{} is {:?}, requested {:?}",
                    header, actual, wanted
                )))
            }
        };
        expect("brand-id", &self.brand_id)?;
        expect("model", &self.model)?;
        expect("device-key-sha3-384", self.device_key.key_id())?;

        if let Some(proposed) = &self.config.proposed_serial {
            let issued = serial.header_str("serial").unwrap_or_default();
            if issued != proposed {
                warn!(proposed = %proposed, issued = %issued, "Device service assigned a different serial");
            }
        }

        db.add(serial.clone()).await?;
        info!(reference = %serial.reference(), "Registered device");
        Ok(serial)
    }
}
