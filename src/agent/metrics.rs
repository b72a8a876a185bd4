//! System metrics collection for the host agent.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::db::{CpuReport, MetricsReport, NetworkReport, UsageReport};

/// Samples system state and produces report bodies. Keeps the sysinfo
/// handles alive between samples so rates can be computed from deltas.
pub struct MetricsSampler {
    sys: System,
    networks: Networks,
    disks: Disks,
    last_sample: Instant,
}

impl MetricsSampler {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            sys,
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
            last_sample: Instant::now(),
        }
    }

    /// Take one sample and assemble a report. `ping` comes from the
    /// loss aggregator's published snapshot.
    pub fn collect(&mut self, ping: HashMap<String, u8>) -> MetricsReport {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();
        self.networks.refresh();
        self.disks.refresh();

        let elapsed = self.last_sample.elapsed().as_secs_f64();
        self.last_sample = Instant::now();

        MetricsReport {
            timestamp: Utc::now().timestamp(),
            cpu: self.cpu_report(),
            memory: self.memory_report(),
            disk: self.disk_report(),
            network: self.network_report(elapsed),
            uptime: System::uptime(),
            ping,
        }
    }

    fn cpu_report(&self) -> CpuReport {
        let load = System::load_average();
        CpuReport {
            usage_percent: self.sys.global_cpu_info().cpu_usage() as f64,
            load_avg: [load.one, load.five, load.fifteen],
        }
    }

    fn memory_report(&self) -> UsageReport {
        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        UsageReport {
            total,
            used,
            free: total.saturating_sub(used),
            usage_percent: percent(used, total),
        }
    }

    fn disk_report(&self) -> UsageReport {
        let mut total = 0u64;
        let mut free = 0u64;
        for disk in self.disks.list() {
            total += disk.total_space();
            free += disk.available_space();
        }
        let used = total.saturating_sub(free);
        UsageReport {
            total,
            used,
            free,
            usage_percent: percent(used, total),
        }
    }

    fn network_report(&self, elapsed: f64) -> NetworkReport {
        let mut received = 0u64;
        let mut transmitted = 0u64;
        let mut total_received = 0u64;
        let mut total_transmitted = 0u64;
        for (_name, data) in &self.networks {
            received += data.received();
            transmitted += data.transmitted();
            total_received += data.total_received();
            total_transmitted += data.total_transmitted();
        }

        let rate = |bytes: u64| {
            if elapsed > 0.0 {
                (bytes as f64 / elapsed) as u64
            } else {
                0
            }
        };

        NetworkReport {
            upload_speed: rate(transmitted),
            download_speed: rate(received),
            total_upload: total_transmitted,
            total_download: total_received,
        }
    }
}

impl Default for MetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64) * 100.0
}
