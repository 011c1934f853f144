//! Periodic recovery of jobs stuck in `processing`.
//!
//! There is no worker lease: a worker that dies mid-job leaves the row in
//! `processing` forever. This task fails such rows once they have not moved
//! for the configured timeout, so operators see them and can resubmit.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::ImportEngine;

/// Sweep at most once a minute, and at least twice per timeout.
fn sweep_interval(timeout: Duration) -> Duration {
    (timeout / 2).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

/// Run the stale-job sweep until `cancel` is triggered.
pub async fn run(engine: Arc<ImportEngine>, timeout: Duration, cancel: CancellationToken) {
    let period = sweep_interval(timeout);
    tracing::info!(
        timeout_secs = timeout.as_secs(),
        interval_secs = period.as_secs(),
        "Stale job reaper started"
    );

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stale job reaper stopping");
                break;
            }
            _ = interval.tick() => {
                match engine.lifecycle.fail_stale_jobs(timeout).await {
                    Ok(0) => tracing::debug!("Stale job reaper: nothing to fail"),
                    Ok(failed) => tracing::warn!(failed, "Stale job reaper: failed stuck jobs"),
                    Err(e) => tracing::error!(error = %e, "Stale job reaper: sweep failed"),
                }
            }
        }
    }
}
