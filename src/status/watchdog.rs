//! Liveness watchdog for self-reporting hosts.
//!
//! Hosts are not probed; their liveness is derived from the staleness of
//! the last metrics snapshot. The debounce rule is the same one endpoint
//! checks use. Hosts carry no status history, only the notification
//! timestamp changes.

use chrono::{DateTime, Utc};

use crate::db::{DbError, Host, Store};
use crate::notify::{self, Notifier};

use super::{decide, Notice};

/// A host with no snapshot younger than this is considered down.
pub const STALE_AFTER_SECS: i64 = 300;

/// Whether a host's snapshot is too old to count as alive. A host that
/// never reported is stale by definition.
pub fn is_stale(snapshot_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    snapshot_time.map_or(true, |t| (now - t).num_seconds() > STALE_AFTER_SECS)
}

/// Run one watchdog pass over all hosts, sequentially. A failure for
/// one host never aborts the pass.
pub fn run_watchdog_pass(store: &Store, notifier: &Notifier, now: DateTime<Utc>) {
    let hosts = match store.get_hosts() {
        Ok(hosts) => hosts,
        Err(e) => {
            tracing::error!("Watchdog: failed to load hosts: {}", e);
            return;
        }
    };

    for host in hosts {
        if let Err(e) = evaluate_host(store, notifier, &host, now) {
            tracing::error!("Watchdog: evaluation failed for {}: {}", host.name, e);
        }
    }
}

/// Evaluate one host. Returns the notice that was actually dispatched.
fn evaluate_host(
    store: &Store,
    notifier: &Notifier,
    host: &Host,
    now: DateTime<Utc>,
) -> Result<Option<Notice>, DbError> {
    let snapshot_time = store.get_host_metrics(&host.id)?.map(|s| s.time);
    let stale = is_stale(snapshot_time, now);

    // `last_notified_down_at` is non-null exactly while a notified
    // failing run is ongoing, so it doubles as the previous status.
    let prev_failing = host.last_notified_down_at.is_some();
    let decision = decide(prev_failing, host.last_notified_down_at, stale, now);

    if decision.notice.is_none() && decision.notified_down_at == host.last_notified_down_at {
        return Ok(None);
    }

    let won = store.update_host_notified(
        &host.id,
        host.last_notified_down_at,
        decision.notified_down_at,
    )?;
    if !won {
        tracing::debug!(
            "Host {}: concurrent watchdog pass already applied, dropping notification",
            host.name
        );
        return Ok(None);
    }

    if let Some(notice) = decision.notice {
        let text = match notice {
            Notice::Down => notify::host_down_message(host),
            Notice::Recovered => notify::host_recovered_message(host),
        };
        tracing::info!("Host {}: {:?} (stale={})", host.name, notice, stale);
        notifier.dispatch(text);
        return Ok(Some(notice));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CpuReport, MetricsReport, NetworkReport, UsageReport};
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn empty_report() -> MetricsReport {
        MetricsReport {
            timestamp: 0,
            cpu: CpuReport {
                usage_percent: 0.0,
                load_avg: [0.0; 3],
            },
            memory: UsageReport {
                total: 0,
                used: 0,
                free: 0,
                usage_percent: 0.0,
            },
            disk: UsageReport {
                total: 0,
                used: 0,
                free: 0,
                usage_percent: 0.0,
            },
            network: NetworkReport {
                upload_speed: 0,
                download_speed: 0,
                total_upload: 0,
                total_download: 0,
            },
            uptime: 0,
            ping: HashMap::new(),
        }
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        assert!(is_stale(None, now));
        assert!(is_stale(Some(now - Duration::seconds(301)), now));
        assert!(!is_stale(Some(now - Duration::seconds(300)), now));
        assert!(!is_stale(Some(now), now));
    }

    #[tokio::test]
    async fn test_silent_host_notifies_once_then_cooldown() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let notifier = Notifier::new(Arc::new(store.clone()));
        let host = store.add_host("web-1", 0).unwrap();

        // Never reported: down notification fires on the first pass.
        let t0 = Utc::now();
        let host_view = store.get_host(&host.id).unwrap();
        let first = evaluate_host(&store, &notifier, &host_view, t0).unwrap();
        assert_eq!(first, Some(Notice::Down));
        assert_eq!(
            store.get_host(&host.id).unwrap().last_notified_down_at,
            Some(t0)
        );

        // Still silent half an hour later: suppressed by the cooldown.
        let host_view = store.get_host(&host.id).unwrap();
        let second =
            evaluate_host(&store, &notifier, &host_view, t0 + Duration::seconds(1800)).unwrap();
        assert_eq!(second, None);

        // Past the cooldown the reminder fires again.
        let host_view = store.get_host(&host.id).unwrap();
        let third =
            evaluate_host(&store, &notifier, &host_view, t0 + Duration::seconds(3700)).unwrap();
        assert_eq!(third, Some(Notice::Down));
    }

    #[tokio::test]
    async fn test_reporting_host_recovers() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let notifier = Notifier::new(Arc::new(store.clone()));
        let host = store.add_host("web-1", 0).unwrap();

        let t0 = Utc::now();
        let host_view = store.get_host(&host.id).unwrap();
        evaluate_host(&store, &notifier, &host_view, t0).unwrap();

        // A fresh report arrives; the next pass sends the recovery.
        store
            .upsert_host_metrics(&host.id, t0 + Duration::seconds(60), &empty_report())
            .unwrap();
        let host_view = store.get_host(&host.id).unwrap();
        let notice =
            evaluate_host(&store, &notifier, &host_view, t0 + Duration::seconds(90)).unwrap();
        assert_eq!(notice, Some(Notice::Recovered));
        assert_eq!(store.get_host(&host.id).unwrap().last_notified_down_at, None);
    }

    #[tokio::test]
    async fn test_fresh_host_stays_silent() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let notifier = Notifier::new(Arc::new(store.clone()));
        let host = store.add_host("web-1", 0).unwrap();

        let t0 = Utc::now();
        store.upsert_host_metrics(&host.id, t0, &empty_report()).unwrap();

        let host_view = store.get_host(&host.id).unwrap();
        let notice =
            evaluate_host(&store, &notifier, &host_view, t0 + Duration::seconds(30)).unwrap();
        assert_eq!(notice, None);
        assert_eq!(store.get_host(&host.id).unwrap().last_notified_down_at, None);
    }
}
