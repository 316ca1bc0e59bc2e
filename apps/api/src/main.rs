mod config;
mod db;
mod errors;
mod models;
mod notify;
mod pipeline;
mod routes;
mod state;
mod store;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StoreBackend};
use crate::db::create_pool;
use crate::notify::{EligibleListNotifier, LogOnlyNotifier, RedisQueueNotifier};
use crate::pipeline::service::PlacementPipeline;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{memory::MemoryStore, postgres::PgStore, PlacementStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Placement API v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn PlacementStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            Arc::new(PgStore::new(create_pool(url).await?))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Eligible-list dispatcher queue (optional)
    let notifier: Arc<dyn EligibleListNotifier> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!(
                "Redis client initialized (queue: {})",
                config.eligible_list_queue
            );
            Arc::new(RedisQueueNotifier::new(
                client,
                config.eligible_list_queue.clone(),
            ))
        }
        None => {
            info!("REDIS_URL not set; eligible lists will only be logged");
            Arc::new(LogOnlyNotifier)
        }
    };

    let state = AppState {
        pipeline: PlacementPipeline::new(store, notifier),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the placement dashboard has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
