use ghostmaker_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (telemetry, stores, pipeline, routes)
    let app = ghostmaker_api::setup::initialize_app(&config).await?;

    ghostmaker_api::setup::server::start_server(&config, app.router).await?;

    app.services.shutdown().await;
    Ok(())
}
