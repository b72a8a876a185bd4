//! upwatch server binary.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upwatch::config::ServerConfig;
use upwatch::db::Store;
use upwatch::notify::Notifier;
use upwatch::probe;
use upwatch::scheduler::Scheduler;
use upwatch::web::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("upwatch=info".parse()?),
        )
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting upwatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!(
        "Database initialized: {} endpoints, {} hosts",
        store.get_endpoints()?.len(),
        store.get_hosts()?.len()
    );

    // Start the check scheduler
    let notifier = Notifier::new(store.clone());
    let client = probe::build_client()?;
    let scheduler = Scheduler::new(
        store.clone(),
        notifier,
        client,
        Duration::from_secs(cfg.check_interval_secs),
    );
    scheduler.start();

    // Start web server
    let server = Server::new(cfg, store);
    server.start().await?;

    Ok(())
}
