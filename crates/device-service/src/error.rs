//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use device_registration::ErrorList;
use thiserror::Error;

/// Device service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Request ids are switched off (`501`)
    #[error("request ids are not issued by this service")]
    RequestIdsDisabled,

    /// Refused serial-request (`400`); the message reaches the device owner
    #[error("{0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::RequestIdsDisabled => StatusCode::NOT_IMPLEMENTED.into_response(),
            ServiceError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorList::single(message))).into_response()
            }
            ServiceError::Config(message) | ServiceError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorList::single(message)),
            )
                .into_response(),
        }
    }
}

impl From<assertion_core::AssertionError> for ServiceError {
    fn from(err: assertion_core::AssertionError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}
