//! HTTP reachability checker.

use std::time::{Duration, Instant};

use crate::db::CheckStatus;

use super::CheckOutcome;

/// Total budget for one check, connection through final redirect.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the shared client used for checks. Redirects are followed
/// (reqwest default policy); the timeout bounds the whole operation.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(CHECK_TIMEOUT).build()
}

/// Run one reachability check against the given URL.
///
/// Uses HEAD so no body is transferred. Responses below 500 count as
/// reachable: a client error still means a live, responding server.
pub async fn check_url(client: &reqwest::Client, url: &str) -> CheckOutcome {
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    };

    let start = Instant::now();

    match client.head(&url).send().await {
        Ok(response) => {
            let code = response.status().as_u16();
            CheckOutcome {
                status: classify_code(code),
                status_code: Some(code),
                response_time_ms: start.elapsed().as_millis() as i64,
            }
        }
        Err(e) => {
            let status = if e.is_timeout() {
                CheckStatus::Timeout
            } else {
                CheckStatus::Error
            };
            CheckOutcome {
                status,
                status_code: None,
                response_time_ms: start.elapsed().as_millis() as i64,
            }
        }
    }
}

fn classify_code(code: u16) -> CheckStatus {
    if (200..500).contains(&code) {
        CheckStatus::Up
    } else {
        CheckStatus::Down
    }
}
