//! Cupids HTTP Server
//!
//! Axum server exposing the checkout, Square webhook, manual credit and
//! message-trigger endpoints over a shared document store.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::Context;
use cupids_core::{DocumentStore, MemoryStore, Seed};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Initialize store
    let store: Arc<dyn DocumentStore> = match &config.seed_file {
        Some(path) => {
            let seed = Seed::from_path(path)
                .with_context(|| format!("Failed to load seed file {}", path.display()))?;
            tracing::info!(
                clients = seed.clients.len(),
                fortune_tellers = seed.fortune_tellers.len(),
                conversations = seed.conversations.len(),
                "✓ Store seeded from {}",
                path.display()
            );
            Arc::new(MemoryStore::from_seed(seed))
        }
        None => {
            tracing::warn!("⚠ Starting with an empty store - set CUPIDS_SEED_FILE to preload accounts");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::from_config(&config, store, cupids_core::clock::system())?;
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("💘 cupids server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health               - Health check");
    tracing::info!("  POST /createCheckout       - Create Square payment link");
    tracing::info!("  POST /squareWebhook        - Square payment webhook");
    tracing::info!("  POST /addPointsManually    - Manual point credit (admin)");
    tracing::info!("  POST /onMessageCreated     - New chat message trigger");
    tracing::info!("  POST /registerPushToken    - Register device push token");
    tracing::info!("  POST /disableNotifications - Turn push notifications off");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
