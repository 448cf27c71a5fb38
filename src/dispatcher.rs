// src/dispatcher.rs
//! Scan Dispatcher: one isolated, time-bounded scan attempt per target.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Error;
use crate::metrics::ensure_metrics_described;
use crate::model::{ScanOutcome, Target};
use crate::registry::TargetRegistry;
use crate::scrape::Scraper;

/// Outcomes of one batch, split by result. Every input target appears in
/// exactly one partition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<ScanOutcome>,
    pub failed: Vec<ScanOutcome>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn push(&mut self, outcome: ScanOutcome) {
        if outcome.success {
            self.succeeded.push(outcome);
        } else {
            self.failed.push(outcome);
        }
    }
}

pub struct Dispatcher {
    registry: Arc<TargetRegistry>,
    scraper: Arc<dyn Scraper>,
    timeout: Duration,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TargetRegistry>,
        scraper: Arc<dyn Scraper>,
        timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            scraper,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch the target's landing page and record it. Never fails: every
    /// error ends up in the returned outcome.
    pub async fn scan_one(&self, target: &Target) -> ScanOutcome {
        ensure_metrics_described();
        counter!("scan_attempts_total").increment(1);
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.timeout,
            self.scraper.fetch_snapshot(&target.address),
        )
        .await
        {
            Ok(Ok(snap)) => self
                .registry
                .update_after_scan(&target.id, snap.page, snap.engine, Utc::now())
                .await
                .map(|_| ()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Timeout {
                address: target.address.clone(),
                after_secs: self.timeout.as_secs(),
            }),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        histogram!("scan_duration_ms").record(elapsed_ms as f64);

        match result {
            Ok(()) => {
                info!(target_id = %target.id, address = %target.address, elapsed_ms, "scan succeeded");
                ScanOutcome::succeeded(target.id, target.address.clone(), elapsed_ms)
            }
            Err(e) => {
                counter!("scan_failures_total").increment(1);
                warn!(
                    target_id = %target.id,
                    address = %target.address,
                    kind = %e.kind(),
                    error = %e,
                    elapsed_ms,
                    "scan failed"
                );
                ScanOutcome::failed(target.id, target.address.clone(), e, elapsed_ms)
            }
        }
    }

    /// Scan all given targets, at most `concurrency` at a time, and wait for
    /// every one of them. Outcomes arrive in completion order.
    pub async fn scan_many(&self, targets: Vec<Target>) -> BatchOutcome {
        let requested = targets.len();
        let outcomes: Vec<ScanOutcome> = stream::iter(targets)
            .map(|t| async move { self.scan_one(&t).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut batch = BatchOutcome::default();
        for o in outcomes {
            batch.push(o);
        }
        debug_assert_eq!(batch.total(), requested);
        info!(
            requested,
            succeeded = batch.succeeded.len(),
            failed = batch.failed.len(),
            "scan batch finished"
        );
        batch
    }
}
