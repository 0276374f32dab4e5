//! HTTP API of the device service

use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{CONTENT_TYPE, USER_AGENT},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{head, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use assertion_core::MEDIA_TYPE;
use device_registration::{RequestIdResponse, REQUEST_ID_PATH, SERIAL_PATH};

use crate::authority::{SerialAuthority, SerialOutcome};
use crate::error::ServiceError;

/// Application state shared across handlers
#[derive(Debug)]
pub struct AppState {
    pub authority: SerialAuthority,
}

/// Capability probe
///
/// HEAD /
pub async fn probe() -> StatusCode {
    StatusCode::OK
}

/// Issue a request id
///
/// POST /api/v1/snaps/auth/request-id
pub async fn request_id(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RequestIdResponse>, ServiceError> {
    let user_agent = require_user_agent(&headers)?;
    info!(user_agent = %user_agent, "Request id requested");
    let request_id = state.authority.issue_request_id()?;
    Ok(Json(RequestIdResponse { request_id }))
}

/// Process a serial-request
///
/// POST /api/v1/snaps/auth/devices
pub async fn serial(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let user_agent = require_user_agent(&headers)?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != MEDIA_TYPE {
        return Err(ServiceError::BadRequest(format!(
            "unexpected content type {:?}, expected {}",
            content_type, MEDIA_TYPE
        )));
    }

    info!(user_agent = %user_agent, bytes = body.len(), "Serial-request received");

    match state.authority.process(&body)? {
        SerialOutcome::Issued(serial) => {
            Ok((StatusCode::OK, [(CONTENT_TYPE, MEDIA_TYPE)], serial.encode()).into_response())
        }
        SerialOutcome::Pending => Ok(StatusCode::ACCEPTED.into_response()),
    }
}

/// Devices must identify themselves on every POST
fn require_user_agent(headers: &HeaderMap) -> Result<&str, ServiceError> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("missing user agent".into()))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", head(probe))
        .route(REQUEST_ID_PATH, post(request_id))
        .route(SERIAL_PATH, post(serial))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
