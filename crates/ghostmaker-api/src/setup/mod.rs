//! Application setup and initialization

pub mod routes;
pub mod server;
pub mod services;

use anyhow::Result;
use ghostmaker_core::Config;
use ghostmaker_infra::{init_telemetry, LogFormat};

use self::services::Services;

pub struct App {
    pub router: axum::Router,
    pub services: Services,
}

/// Initialize the entire application
pub async fn initialize_app(config: &Config) -> Result<App> {
    init_telemetry(LogFormat::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!("Configuration loaded and validated successfully");

    let services = services::initialize_services(config).await?;
    let router = routes::setup_routes(services.state.clone(), config.server().max_event_body_bytes);

    Ok(App { router, services })
}
