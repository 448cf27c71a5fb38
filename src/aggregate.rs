// src/aggregate.rs
//! Severity Aggregator: stateless read-side projection over current items.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ErrorKind, Result};
use crate::model::{SeverityCounts, SeveritySummary, Target, TargetId};
use crate::registry::TargetRegistry;

pub struct Aggregator {
    registry: Arc<TargetRegistry>,
}

impl Aggregator {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        Self { registry }
    }

    pub async fn summarize(&self, target_id: &TargetId) -> Result<SeveritySummary> {
        let target = self.registry.get(target_id).await?;
        self.summarize_target(&target).await
    }

    /// Best effort: ids that no longer resolve are left out. Store failures
    /// still abort the call.
    pub async fn summarize_many(&self, target_ids: &[TargetId]) -> Result<Vec<SeveritySummary>> {
        let mut out = Vec::with_capacity(target_ids.len());
        for id in target_ids {
            if let Some(s) = self.summarize_existing(id).await? {
                out.push(s);
            }
        }
        Ok(out)
    }

    /// One summary per registered target, in registration order. Targets
    /// removed while the summaries are built are left out.
    pub async fn summarize_all(&self) -> Result<Vec<SeveritySummary>> {
        let ids: Vec<TargetId> = self.registry.list().await?.iter().map(|t| t.id).collect();
        self.summarize_many(&ids).await
    }

    async fn summarize_existing(&self, id: &TargetId) -> Result<Option<SeveritySummary>> {
        match self.summarize(id).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(target_id = %id, "skipping vanished target in summary");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn summarize_target(&self, target: &Target) -> Result<SeveritySummary> {
        let items = self.registry.store().list_items(&target.id).await?;
        let counts: SeverityCounts = items.iter().collect();
        Ok(SeveritySummary {
            target_id: target.id,
            name: target.name.clone(),
            address: target.address.clone(),
            last_scanned_at: target.last_scanned_at,
            total: counts.sum(),
            counts,
        })
    }
}
