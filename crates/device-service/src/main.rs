//! Device Service Binary
//!
//! Runs the reference device service over HTTP.

use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use assertion_core::KeyPair;
use device_service::{create_router, AppState, SerialAuthority, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env()?;

    // Initialize logging
    let log_level = config.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let key = match config.key_seed {
        Some(seed) => KeyPair::from_bytes(&seed),
        None => {
            warn!("DEVICE_SERVICE_KEY not set, using an ephemeral signing key");
            KeyPair::generate()
        }
    };
    info!(
        authority = %config.authority.authority_id,
        key_id = %key.key_id(),
        public_key = %key.public_key().encode(),
        port = config.port,
        "Starting device service"
    );

    let state = Arc::new(AppState {
        authority: SerialAuthority::new(key, config.authority.clone()),
    });
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Device service listening");

    axum::serve(listener, app).await?;
    Ok(())
}
