// src/facade.rs
//! Orchestration Facade: the caller surface over registry, dispatcher,
//! pipeline, and aggregator. Holds no state of its own beyond the
//! components; every error leaving it is a [`ServiceError`].

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::aggregate::Aggregator;
use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::dispatcher::{BatchOutcome, Dispatcher};
use crate::error::{Error, ErrorKind};
use crate::model::{Item, ItemStatus, ScanOutcome, SeveritySummary, Target, TargetId};
use crate::pipeline::Pipeline;
use crate::registry::TargetRegistry;
use crate::scrape::Scraper;
use crate::store::RecordStore;

/// Caller-facing error: a taxonomy kind plus a human-readable message.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<Error> for ServiceError {
    fn from(e: Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Batch summary for user notification: how many ran, how many worked, and
/// which ones did not.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<ScanOutcome>,
}

impl From<BatchOutcome> for BatchReport {
    fn from(b: BatchOutcome) -> Self {
        Self {
            total: b.total(),
            succeeded: b.succeeded.len(),
            failed: b.failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub target_id: TargetId,
    /// Thread addresses listed on the forum.
    pub discovered: usize,
    /// Items whose content was fetched by this pass.
    pub extracted: usize,
    /// Items whose content could not be fetched.
    pub failed: usize,
    /// Earlier fetch failures tried again, counted in the two above.
    pub retried: usize,
    /// Present when a rescan ran before extraction; its `items` carries the
    /// discovered thread count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescan: Option<ScanOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub target_id: TargetId,
    pub classified: usize,
    pub failed: usize,
}

pub struct Orchestrator {
    registry: Arc<TargetRegistry>,
    dispatcher: Dispatcher,
    pipeline: Pipeline,
    aggregator: Aggregator,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        scraper: Arc<dyn Scraper>,
        classifier: Arc<dyn Classifier>,
        cfg: &EngineConfig,
    ) -> Self {
        let registry = Arc::new(TargetRegistry::new(store));
        Self {
            dispatcher: Dispatcher::new(
                registry.clone(),
                scraper.clone(),
                cfg.scan.timeout(),
                cfg.scan.concurrency,
            ),
            pipeline: Pipeline::new(
                registry.clone(),
                scraper,
                classifier,
                cfg.extract.fetch_timeout(),
                cfg.extract.concurrency,
            ),
            aggregator: Aggregator::new(registry.clone()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub async fn register_target(
        &self,
        address: &str,
        name: &str,
        description: &str,
    ) -> ServiceResult<Target> {
        Ok(self.registry.register(address, name, description).await?)
    }

    pub async fn list_targets(&self) -> ServiceResult<Vec<Target>> {
        Ok(self.registry.list().await?)
    }

    /// Returns how many items were removed with the target.
    pub async fn remove_target(&self, id: &TargetId) -> ServiceResult<usize> {
        Ok(self.registry.remove(id).await?)
    }

    /// Scan one target. A failed scan surfaces as its error.
    pub async fn scan_target(&self, id: &TargetId) -> ServiceResult<ScanOutcome> {
        let target = self.registry.get(id).await?;
        let outcome = self.dispatcher.scan_one(&target).await;
        match &outcome.error {
            Some(e) => Err(e.clone().into()),
            None => Ok(outcome),
        }
    }

    pub async fn scan_all(&self) -> ServiceResult<BatchReport> {
        let targets = self.registry.list().await?;
        let report = BatchReport::from(self.dispatcher.scan_many(targets).await);
        info!(total = report.total, failed = report.failed.len(), "scan_all finished");
        Ok(report)
    }

    /// Scan the given targets. Ids that do not resolve are reported as
    /// failed `not_found` outcomes instead of failing the batch.
    pub async fn scan_targets(&self, ids: &[TargetId]) -> ServiceResult<BatchReport> {
        let mut targets = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.registry.get(id).await {
                Ok(t) => targets.push(t),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    missing.push(ScanOutcome::failed(*id, String::new(), e, 0));
                }
                Err(e) => return Err(e.into()),
            }
        }
        let mut batch = self.dispatcher.scan_many(targets).await;
        for o in missing {
            batch.push(o);
        }
        Ok(batch.into())
    }

    /// Extract new posts for a target, optionally refreshing its snapshot
    /// first. A failed rescan aborts before extraction.
    pub async fn extract_posts(&self, id: &TargetId, rescan: bool) -> ServiceResult<ExtractionReport> {
        let rescan = if rescan {
            Some(self.scan_target(id).await?)
        } else {
            None
        };
        let extraction = self.pipeline.extract(id).await?;
        let failed = extraction
            .fetched
            .iter()
            .filter(|it| it.status == ItemStatus::Failed)
            .count();
        Ok(ExtractionReport {
            target_id: extraction.target_id,
            discovered: extraction.discovered,
            extracted: extraction.fetched.len() - failed,
            failed,
            retried: extraction.retried,
            rescan: rescan.map(|o| o.with_items(extraction.discovered)),
        })
    }

    pub async fn classify_posts(&self, id: &TargetId) -> ServiceResult<ClassificationReport> {
        let items = self.pipeline.classify_pending(id).await?;
        Ok(classification_report(*id, &items))
    }

    pub async fn run_full_pass(&self, id: &TargetId) -> ServiceResult<Vec<Item>> {
        Ok(self.pipeline.run_full_pass(id).await?)
    }

    pub async fn list_posts(&self, id: &TargetId) -> ServiceResult<Vec<Item>> {
        self.registry.get(id).await?;
        Ok(self.registry.store().list_items(id).await?)
    }

    /// One target's summary, or every target's when `id` is `None`.
    pub async fn aggregate(&self, id: Option<&TargetId>) -> ServiceResult<Vec<SeveritySummary>> {
        match id {
            Some(id) => Ok(vec![self.aggregator.summarize(id).await?]),
            None => Ok(self.aggregator.summarize_all().await?),
        }
    }

    /// Summaries for the given ids; unknown ids are skipped.
    pub async fn aggregate_many(&self, ids: &[TargetId]) -> ServiceResult<Vec<SeveritySummary>> {
        Ok(self.aggregator.summarize_many(ids).await?)
    }
}

fn classification_report(target_id: TargetId, items: &[Item]) -> ClassificationReport {
    let classified = items
        .iter()
        .filter(|it| it.status == ItemStatus::Classified)
        .count();
    ClassificationReport {
        target_id,
        classified,
        failed: items.len() - classified,
    }
}
