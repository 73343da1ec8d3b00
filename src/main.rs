//! Revenue Dashboard Service - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Configure the Zoho Analytics client, if its settings are present
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

use revenue_dashboard_server::{config, db, routes, services::zoho_client::ZohoClient, state::AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let zoho = ZohoClient::from_config(&config)?;
    if zoho.is_some() {
        tracing::info!("Zoho Analytics source enabled");
    } else {
        tracing::info!("Zoho Analytics not configured; only the database source is available");
    }

    let port = config.server_port;
    let app = routes::create_router(AppState::new(config, pool, zoho))?;

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
