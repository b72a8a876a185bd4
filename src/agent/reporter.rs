//! Metrics reporting loop: sample, attach loss snapshot, send.

use std::time::Duration;

use crate::config::AgentConfig;
use crate::db::ReportAck;

use super::carrier::LossSnapshot;
use super::metrics::MetricsSampler;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the reporting loop. Never returns under normal operation; a
/// failed report is logged and retried on the next cycle, never queued.
pub async fn report_loop(
    cfg: AgentConfig,
    snapshot: LossSnapshot,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let report_url = format!("{}/api/report", cfg.server_url.trim_end_matches('/'));

    let mut sampler = MetricsSampler::new();
    let mut interval_secs = cfg.report_interval;

    loop {
        let ping = snapshot.read().await.clone();
        let report = sampler.collect(ping);

        match client
            .post(&report_url)
            .bearer_auth(&cfg.token)
            .json(&report)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                // The server answers with the current global interval.
                if let Ok(ack) = resp.json::<ReportAck>().await {
                    if ack.interval >= 1 && ack.interval != interval_secs {
                        tracing::info!("Report interval changed to {}s", ack.interval);
                        interval_secs = ack.interval;
                    }
                }
            }
            Ok(resp) => {
                tracing::warn!("Report rejected: {}", resp.status());
            }
            Err(e) => {
                tracing::warn!("Report failed: {}", e);
            }
        }

        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
    }
}
