//! ISBank - bank-linking backend

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use isbank::{
    api::{self, AppState},
    config::Config,
    gateways::Gateways,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "isbank=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ISBank...");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yml"));
    let config = Config::load_with_env(&config_path)?;
    tracing::info!("Configuration loaded from {}", config_path.display());

    // Sandbox builds run entirely against in-memory collaborators
    #[cfg(feature = "sandbox")]
    let gateways = {
        tracing::warn!("Sandbox mode: using in-memory gateways");
        Gateways::sandbox()
    };
    #[cfg(not(feature = "sandbox"))]
    let gateways = Gateways::connect(&config).await?;

    let state = AppState::new(gateways, &config);
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
