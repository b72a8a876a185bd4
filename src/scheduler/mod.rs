//! Probe scheduler: periodically evaluates all endpoints in bounded
//! batches, then runs the host liveness watchdog.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::Store;
use crate::notify::Notifier;
use crate::probe;
use crate::status;

/// Upper bound on simultaneously in-flight endpoint checks.
pub const MAX_CONCURRENT_CHECKS: usize = 10;

/// Drives check cycles on a fixed cadence.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<Store>,
    notifier: Notifier,
    client: reqwest::Client,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        notifier: Notifier,
        client: reqwest::Client,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            client,
            interval,
        }
    }

    /// Start the trigger loop as a background task. Skipped ticks are
    /// dropped, so a slow cycle never stacks up behind itself.
    pub fn start(&self) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                scheduler.run_cycle().await;
            }
        });
    }

    /// Run one full cycle: all endpoint checks in waves of at most
    /// `MAX_CONCURRENT_CHECKS`, then the watchdog pass.
    pub async fn run_cycle(&self) {
        let endpoints = match self.store.get_endpoints() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                tracing::error!("Scheduler: failed to load endpoints: {}", e);
                return;
            }
        };

        tracing::debug!("Scheduler: checking {} endpoints", endpoints.len());

        for wave in endpoints.chunks(MAX_CONCURRENT_CHECKS) {
            let mut handles = Vec::with_capacity(wave.len());

            for endpoint in wave {
                let store = self.store.clone();
                let notifier = self.notifier.clone();
                let client = self.client.clone();
                let endpoint = endpoint.clone();

                handles.push(tokio::spawn(async move {
                    let outcome = probe::check_url(&client, &endpoint.url).await;
                    if let Err(e) =
                        status::apply_outcome(&store, &notifier, &endpoint, &outcome, Utc::now())
                    {
                        tracing::error!(
                            "Scheduler: check for {} could not be recorded: {}",
                            endpoint.name,
                            e
                        );
                    }
                }));
            }

            // Await the whole wave before starting the next one.
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("Scheduler: check task panicked: {}", e);
                }
            }
        }

        status::run_watchdog_pass(&self.store, &self.notifier, Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CheckStatus;
    use chrono::Duration as ChronoDuration;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_cycle_records_failures_without_aborting() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let notifier = Notifier::new(store.clone());
        let client = probe::build_client().unwrap();

        // Both endpoints refuse connections; the cycle must classify
        // them as ERROR rather than abort.
        let a = store.add_endpoint("A", "http://127.0.0.1:1").unwrap();
        let b = store.add_endpoint("B", "http://127.0.0.1:1").unwrap();

        let scheduler = Scheduler::new(
            store.clone(),
            notifier,
            client,
            Duration::from_secs(60),
        );
        scheduler.run_cycle().await;

        for id in [&a.id, &b.id] {
            let endpoint = store.get_endpoint(id).unwrap();
            assert_eq!(endpoint.last_status, CheckStatus::Error);
            assert!(endpoint.last_checked_at.is_some());
            let events = store
                .get_status_events_since(id, Utc::now() - ChronoDuration::hours(1))
                .unwrap();
            assert_eq!(events.len(), 1);
        }
    }

    #[test]
    fn test_wave_sizing() {
        let items: Vec<u32> = (0..25).collect();
        let waves: Vec<usize> = items.chunks(MAX_CONCURRENT_CHECKS).map(<[u32]>::len).collect();
        assert_eq!(waves, vec![10, 10, 5]);
    }
}
