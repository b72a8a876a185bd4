//! upwatch host agent binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upwatch::agent;
use upwatch::config::AgentConfig;

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

    let cfg = AgentConfig::load()?;
    tracing::info!(
        "Starting upwatch agent, reporting to {} ({} routes)",
        cfg.server_url,
        cfg.routes.len()
    );

    agent::run(cfg).await
}
