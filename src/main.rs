//! Statusboard - endpoint uptime monitoring engine
//!
//! Polls configured HTTP endpoints on a fixed cadence, records every check,
//! and serves the status, history and check-now API the dashboard reads.

mod config;
mod db;
mod probe;
mod scheduler;
#[cfg(test)]
mod testutil;
mod uptime;
mod web;

use config::{ServerConfig, CHECK_INTERVAL};
use db::Store;
use scheduler::{RetentionManager, Scheduler, SchedulerConfig};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("statusboard=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting Statusboard on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    if let Some(seed_file) = &cfg.seed_file {
        let added = db::seed_endpoints(&store, seed_file)?;
        tracing::info!("Seeded {} endpoints from {}", added, seed_file);
    }

    // Create scheduler
    let scheduler = Scheduler::new(
        store.clone(),
        SchedulerConfig {
            interval: CHECK_INTERVAL,
            probe_timeout: cfg.probe_timeout,
            max_concurrent_probes: cfg.max_concurrent_probes,
        },
    )?;
    scheduler.start();

    let retention = RetentionManager::new(store.clone(), cfg.retention_days);
    retention.start();

    // Start web server
    let server = Server::new(cfg, store, scheduler.clone());
    server.start().await?;

    scheduler.stop();
    retention.stop().await;

    Ok(())
}
