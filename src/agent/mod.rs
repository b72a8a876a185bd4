//! Host agent: route probing, loss aggregation, and metrics reporting.

mod carrier;
mod metrics;
mod reporter;

pub use carrier::*;
pub use metrics::*;
pub use reporter::*;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::AgentConfig;

/// Run the agent: one prober per route, the loss aggregator, and the
/// reporting loop, all for the lifetime of the process.
pub async fn run(cfg: AgentConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let snapshot: LossSnapshot = Arc::new(RwLock::new(HashMap::new()));

    let mut windows = Vec::with_capacity(cfg.routes.len());
    for route in &cfg.routes {
        let window = RouteWindow::new();
        spawn_prober(route.clone(), window.clone());
        windows.push((route.key.clone(), window));
    }
    spawn_aggregator(windows, snapshot.clone());

    report_loop(cfg, snapshot).await
}
