// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::facade::Orchestrator;

/// Spawn a periodic `scan_all`. The first batch starts after one full
/// interval. A tick is skipped while the previous batch is still running.
pub fn spawn_scan_scheduler(orchestrator: Arc<Orchestrator>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match orchestrator.scan_all().await {
                Ok(report) => tracing::info!(
                    target: "scheduler",
                    total = report.total,
                    succeeded = report.succeeded,
                    failed = report.failed.len(),
                    "scheduled scan tick"
                ),
                Err(e) => tracing::warn!(target: "scheduler", error = %e, "scheduled scan failed"),
            }
        }
    })
}
