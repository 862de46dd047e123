//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{BufferedClipboard, OpenAiGenerativeAdapter, RasterRenderer, SqliteKvStore},
    config::Config,
    error::ApiError,
    web::{self, state::AppState},
};
use std::sync::Arc;
use std::time::Duration;
use study_assistant_core::Services;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let kv_store = Arc::new(SqliteKvStore::connect(&config.database_url).await?);
    info!("Running database migrations...");
    kv_store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let api_key = config
        .openai_api_key
        .as_deref()
        .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?;
    let model = Arc::new(OpenAiGenerativeAdapter::from_key(
        api_key,
        config.openai_base_url.as_deref(),
    ));
    let renderer = Arc::new(RasterRenderer::new(config.export_font_path.clone()));

    let services = Services::new(
        kv_store,
        model,
        renderer,
        Arc::new(BufferedClipboard::default()),
    )
    .with_tiers(config.model_tiers())
    .with_max_file_bytes(config.max_upload_bytes);

    // --- 4. Build the Shared AppState & Seed the Administrator ---
    let app_state = Arc::new(AppState::new(config.clone(), services));
    app_state.seed_admin().await?;

    // --- 5. Evict Idle Workspaces & Create the Web Router ---
    let sweeper = app_state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweeper.evict_idle().await;
        }
    });
    let app = web::router(app_state)?;

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
