//! Reachability checking for monitored endpoints.

mod http;

pub use http::*;

use crate::db::CheckStatus;

/// Result of a single reachability check. Every failure path resolves
/// into one of the failing statuses; a check never errors.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub status_code: Option<u16>,
    pub response_time_ms: i64,
}
