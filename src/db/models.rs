//! Database model and wire types.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome classification of a reachability check.
///
/// `Pending` is the pre-first-check state and never produced by a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Pending,
    Up,
    Down,
    Timeout,
    Error,
}

impl CheckStatus {
    /// Whether this status counts as failing for notification purposes.
    pub fn is_failing(self) -> bool {
        matches!(self, CheckStatus::Down | CheckStatus::Timeout | CheckStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pending => "PENDING",
            CheckStatus::Up => "UP",
            CheckStatus::Down => "DOWN",
            CheckStatus::Timeout => "TIMEOUT",
            CheckStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(CheckStatus::Pending),
            "UP" => Ok(CheckStatus::Up),
            "DOWN" => Ok(CheckStatus::Down),
            "TIMEOUT" => Ok(CheckStatus::Timeout),
            "ERROR" => Ok(CheckStatus::Error),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// A monitored network endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_status: CheckStatus,
    pub last_status_code: Option<u16>,
    pub last_response_time_ms: Option<i64>,
    /// Set while the current unbroken failing run has been notified,
    /// cleared on recovery.
    pub last_notified_down_at: Option<DateTime<Utc>>,
}

/// One immutable row of check history. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub endpoint_id: String,
    pub time: DateTime<Utc>,
    pub status: CheckStatus,
    pub status_code: Option<u16>,
    pub response_time_ms: i64,
}

/// A self-reporting monitored host.
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub id: String,
    pub name: String,
    /// Per-host reporting credential. Never serialized into API responses.
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub sort_order: i64,
    pub last_notified_down_at: Option<DateTime<Utc>>,
}

/// Metrics report body as sent by the agent. Everything except `ping`
/// is required; a report missing any section is rejected at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub timestamp: i64,
    pub cpu: CpuReport,
    pub memory: UsageReport,
    pub disk: UsageReport,
    pub network: NetworkReport,
    pub uptime: u64,
    /// Per-route packet loss percent, 0..=100. Defaults to empty.
    #[serde(default)]
    pub ping: HashMap<String, u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuReport {
    pub usage_percent: f64,
    pub load_avg: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkReport {
    pub upload_speed: u64,
    pub download_speed: u64,
    pub total_upload: u64,
    pub total_download: u64,
}

/// The single stored metrics snapshot of a host. Overwritten on every
/// report; `time` is the server-side receive time used for staleness.
#[derive(Debug, Clone, Serialize)]
pub struct HostSnapshot {
    pub time: DateTime<Utc>,
    pub report: MetricsReport,
}

/// Ingestion acknowledgement returned to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportAck {
    pub ok: bool,
    /// Current global report interval in seconds.
    pub interval: u64,
}

/// Singleton notification channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
}
