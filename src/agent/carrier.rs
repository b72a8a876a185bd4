//! Per-route TCP probing and packet loss aggregation.
//!
//! One prober loop per route pushes connect outcomes into a bounded
//! sliding window. The aggregator reduces point-in-time copies of the
//! windows to loss percentages and publishes them as one snapshot.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::RwLock;

/// Samples retained per route window.
pub const WINDOW_CAPACITY: usize = 100;
/// Cadence of a route's probe loop.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(2);
/// Budget for one TCP connect attempt.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1500);
/// Cadence of the aggregator loop.
pub const AGGREGATE_INTERVAL: Duration = Duration::from_secs(5);

/// One fixed network target probed as a proxy for a network path.
#[derive(Debug, Clone)]
pub struct RouteTarget {
    pub key: String,
    pub addr: String,
}

/// Default route set used when none is configured.
pub fn default_routes() -> Vec<RouteTarget> {
    [
        ("primary", "1.1.1.1:443"),
        ("secondary", "8.8.8.8:443"),
        ("tertiary", "9.9.9.9:443"),
    ]
    .into_iter()
    .map(|(key, addr)| RouteTarget {
        key: key.to_string(),
        addr: addr.to_string(),
    })
    .collect()
}

/// Parse a route list of the form `key=host:port,key=host:port`.
/// Malformed entries are skipped with a warning.
pub fn parse_routes(raw: &str) -> Vec<RouteTarget> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| match entry.trim().split_once('=') {
            Some((key, addr)) if !key.is_empty() && !addr.is_empty() => Some(RouteTarget {
                key: key.to_string(),
                addr: addr.to_string(),
            }),
            _ => {
                tracing::warn!("Ignoring malformed route entry: {:?}", entry);
                None
            }
        })
        .collect()
}

/// Bounded sliding window of probe outcomes. Written by exactly one
/// prober; readers only ever take copies.
#[derive(Clone, Default)]
pub struct RouteWindow {
    samples: Arc<Mutex<VecDeque<bool>>>,
}

impl RouteWindow {
    pub fn new() -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(WINDOW_CAPACITY))),
        }
    }

    /// Record one outcome, evicting the oldest sample when full.
    pub fn push(&self, ok: bool) {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() == WINDOW_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(ok);
    }

    /// Point-in-time copy of the current contents. The aggregator works
    /// on this copy, never on the live buffer.
    pub fn snapshot(&self) -> Vec<bool> {
        self.samples.lock().unwrap().iter().copied().collect()
    }
}

/// Loss percentage over a set of samples. An empty window reports 0.
pub fn loss_percent(samples: &[bool]) -> u8 {
    if samples.is_empty() {
        return 0;
    }
    let failures = samples.iter().filter(|ok| !**ok).count();
    ((failures as f64 / samples.len() as f64) * 100.0).round() as u8
}

/// The published per-route loss map. Replaced wholesale by the
/// aggregator so readers never observe a partial update.
pub type LossSnapshot = Arc<RwLock<HashMap<String, u8>>>;

/// One bounded-timeout TCP connect attempt.
pub async fn probe_route(addr: &str) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Spawn the probe loop for one route. Runs for the process lifetime.
pub fn spawn_prober(route: RouteTarget, window: RouteWindow) {
    tokio::spawn(async move {
        // Jitter so the route loops don't fire in lockstep.
        let jitter = rand::random::<u64>() % 500;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let mut interval = tokio::time::interval(PROBE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Probing route {} via {}", route.key, route.addr);
        loop {
            interval.tick().await;
            let ok = probe_route(&route.addr).await;
            window.push(ok);
        }
    });
}

/// Spawn the aggregator loop: reduce every route's window copy to a
/// loss percentage and publish the whole map atomically.
pub fn spawn_aggregator(routes: Vec<(String, RouteWindow)>, snapshot: LossSnapshot) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(AGGREGATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let mut next = HashMap::with_capacity(routes.len());
            for (key, window) in &routes {
                let samples = window.snapshot();
                next.insert(key.clone(), loss_percent(&samples));
            }

            *snapshot.write().await = next;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_reports_zero() {
        assert_eq!(loss_percent(&[]), 0);
    }

    #[test]
    fn test_partial_window_loss() {
        // 30 successes then 10 failures, window not full: 25%.
        let mut samples = vec![true; 30];
        samples.extend(vec![false; 10]);
        assert_eq!(loss_percent(&samples), 25);
    }

    #[test]
    fn test_loss_rounds_to_nearest() {
        assert_eq!(loss_percent(&[false, true, true]), 33);
        assert_eq!(loss_percent(&[false, false, true]), 67);
        assert_eq!(loss_percent(&[false; 4]), 100);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let window = RouteWindow::new();
        // Fill with failures, then overwrite with successes.
        for _ in 0..WINDOW_CAPACITY {
            window.push(false);
        }
        for _ in 0..WINDOW_CAPACITY {
            window.push(true);
        }
        let samples = window.snapshot();
        assert_eq!(samples.len(), WINDOW_CAPACITY);
        // Evicted failures no longer influence the result.
        assert_eq!(loss_percent(&samples), 0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let window = RouteWindow::new();
        window.push(true);
        let before = window.snapshot();
        window.push(false);
        assert_eq!(before, vec![true]);
        assert_eq!(window.snapshot(), vec![true, false]);
    }

    #[test]
    fn test_parse_routes() {
        let routes = parse_routes("a=1.1.1.1:443, b=example.com:80,,bad");
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].key, "a");
        assert_eq!(routes[1].addr, "example.com:80");
    }

    #[test]
    fn test_default_routes_count() {
        assert_eq!(default_routes().len(), 3);
    }

    #[tokio::test]
    async fn test_probe_refused_port_fails() {
        assert!(!probe_route("127.0.0.1:1").await);
    }
}
