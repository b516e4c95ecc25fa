mod config;
mod error;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{
    catalog::{Catalog, SharedCatalog},
    checker::{CheckOptions, Checker},
    fetcher::HttpFeedFetcher,
    metrics,
    prober::Prober,
    repair::{MirrorRepair, RedirectResolver, RepairStrategy, SchemeSwap},
    scheduler::{start_scheduler_task, Pipeline, SchedulerConfig},
    store::{CatalogStore, JsonFileStore},
    subscriptions::SubscriptionRegistry,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub catalog: SharedCatalog,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub store: Arc<dyn CatalogStore>,
    pub checker: Arc<Checker>,
    pub pipeline: Arc<Pipeline>,
    pub start_time: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iptv_aggregator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting IPTV Aggregator v{}", env!("CARGO_PKG_VERSION"));

    // Storage; a corrupt catalog aborts startup
    let store: Arc<dyn CatalogStore> = Arc::new(JsonFileStore::new(&config.data_dir).await?);
    let channels = store
        .load_catalog()
        .await
        .context("Failed to load persisted catalog")?;
    let catalog = Catalog::from_channels(channels);
    if catalog.is_empty() {
        tracing::info!("No persisted catalog in {}, starting empty", config.data_dir);
    } else {
        tracing::info!("Catalog loaded: {} channels from {}", catalog.len(), config.data_dir);
    }
    metrics::CATALOG_SIZE.set(catalog.len() as i64);
    let catalog = catalog.shared();

    let subscriptions = Arc::new(SubscriptionRegistry::load(store.clone()).await?);

    // Checker with the default repair strategies, feed mirrors first
    let prober = Prober::new(&config.user_agent)?;
    let repairers: Vec<Arc<dyn RepairStrategy>> = vec![
        Arc::new(MirrorRepair::new(catalog.clone())),
        Arc::new(RedirectResolver::new(
            prober.client().clone(),
            Duration::from_millis(config.check_timeout_ms.max(1) as u64),
        )),
        Arc::new(SchemeSwap),
    ];
    let checker = Arc::new(Checker::new(
        catalog.clone(),
        store.clone(),
        prober,
        repairers,
        config.max_check_concurrency,
        config.check_retries,
    ));
    tracing::info!(
        "Checker initialized (concurrency: {}, cap: {}, timeout: {}ms)",
        config.check_concurrency,
        config.max_check_concurrency,
        config.check_timeout_ms
    );

    // Update pipeline
    let fetcher = HttpFeedFetcher::new(
        &config.user_agent,
        config.fetch_timeout_ms,
        config.max_retries,
        config.max_feed_size_mb,
    )?;
    let mut pipeline = Pipeline::new(
        catalog.clone(),
        subscriptions.clone(),
        store.clone(),
        Arc::new(fetcher),
    );
    if config.check_after_update {
        let options = CheckOptions::new(
            config.check_concurrency,
            config.check_timeout_ms,
            config.auto_repair,
        )?;
        pipeline = pipeline.with_post_check(checker.clone(), options);
    }
    let pipeline = Arc::new(pipeline);

    // Start scheduler (runs in background)
    tokio::spawn(start_scheduler_task(
        pipeline.clone(),
        SchedulerConfig {
            interval_secs: config.update_interval_secs,
            run_on_startup: config.update_on_startup,
        },
    ));

    // Build application state
    let state = Arc::new(AppState {
        config,
        catalog: catalog.clone(),
        subscriptions,
        store: store.clone(),
        checker,
        pipeline,
        start_time: Instant::now(),
    });

    let app = routes::router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final save on the way out
    let channels = catalog.read().await.channels().to_vec();
    store.save_catalog(&channels).await?;
    tracing::info!("Catalog saved ({} channels), shutting down", channels.len());

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
