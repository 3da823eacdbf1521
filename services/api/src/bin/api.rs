//! services/api/src/bin/api.rs

use api_lib::{config::Config, error::ApiError, web};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");
    info!("Uploads stored in {}", config.upload_dir.display());
    info!("Document records stored in {}", config.data_dir.display());

    // --- 2. Initialize Adapters & Build the Shared AppState ---
    let bind_address = config.bind_address;
    let app_state = Arc::new(web::state::AppState::from_config(config).await?);

    // --- 3. Create the Web Router ---
    let app = web::router(app_state)?;

    // --- 4. Start the Server ---
    info!("Starting server on {}", bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
