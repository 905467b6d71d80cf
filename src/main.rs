//! Blogcast relay - CORS relay for the blog/podcast frontend

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blogcast_relay::{
    api::{self, AppState},
    cache::create_thumbnail_cache,
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blogcast_relay=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting blogcast relay...");

    // Load configuration once; nothing re-reads the environment per request
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded ({:?})", config.relay.environment);

    // Misconfiguration is reported per request, so only warn here
    match config.relay.targets() {
        Ok(targets) => tracing::info!("Relaying /api to {}", targets.backend_url),
        Err(e) => tracing::warn!("{}; every relayed request will fail with 500", e),
    }

    let thumbnails = create_thumbnail_cache(&config.thumbnail_cache);
    if thumbnails.is_some() {
        tracing::info!(
            "Thumbnail cache enabled: {} entries, {}s TTL",
            config.thumbnail_cache.max_entries,
            config.thumbnail_cache.ttl_seconds
        );
    }

    let state = AppState::new(config.relay.clone(), thumbnails)?;
    let app = api::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Relay listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
