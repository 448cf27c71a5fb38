// src/registry.rs
//! Target Registry: authoritative set of scan targets and their last-known
//! state. Owns the per-target exclusive sections shared with the dispatcher
//! and the pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::locks::{KeyGuard, KeyedLocks};
use crate::model::{ForumEngine, PageSnapshot, Target, TargetId};
use crate::store::RecordStore;

pub struct TargetRegistry {
    store: Arc<dyn RecordStore>,
    locks: KeyedLocks<TargetId>,
}

impl TargetRegistry {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn register(&self, address: &str, name: &str, description: &str) -> Result<Target> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("target name must not be empty".into()));
        }
        let address = normalize_address(address)?;

        let target = Target {
            id: TargetId::new(),
            address,
            name: name.to_string(),
            description: description.trim().to_string(),
            created_at: Utc::now(),
            last_scanned_at: None,
            snapshot: None,
            engine: None,
        };
        self.store.insert_target(target.clone()).await?;
        info!(target_id = %target.id, address = %target.address, name = %target.name, "target registered");
        Ok(target)
    }

    pub async fn list(&self) -> Result<Vec<Target>> {
        self.store.list_targets().await
    }

    pub async fn get(&self, id: &TargetId) -> Result<Target> {
        self.store
            .get_target(id)
            .await?
            .ok_or(Error::TargetNotFound(*id))
    }

    /// Wait for exclusive access to one target.
    pub async fn lock(&self, id: &TargetId) -> KeyGuard {
        self.locks.lock(id).await
    }

    /// Delete a target and cascade to its items. Waits for any in-flight
    /// exclusive section on the same target. Returns the removed item count.
    pub async fn remove(&self, id: &TargetId) -> Result<usize> {
        let removed = {
            let _guard = self.lock(id).await;
            self.store.delete_target(id).await
        };
        self.locks.prune();
        let removed = removed?;
        counter!("targets_removed_total").increment(1);
        info!(target_id = %id, items_removed = removed, "target removed");
        Ok(removed)
    }

    /// Record a successful scan. Fails with `TargetNotFound` when the target
    /// was removed while the scan was in flight; the result is then dropped.
    pub async fn update_after_scan(
        &self,
        id: &TargetId,
        snapshot: PageSnapshot,
        engine: ForumEngine,
        scanned_at: DateTime<Utc>,
    ) -> Result<Target> {
        let _guard = self.lock(id).await;
        let mut target = self
            .store
            .get_target(id)
            .await?
            .ok_or(Error::TargetNotFound(*id))?;
        target.snapshot = Some(snapshot);
        target.engine = Some(engine);
        target.last_scanned_at = Some(scanned_at);
        self.store.update_target(target.clone()).await?;
        debug!(target_id = %id, engine = ?engine, "scan state recorded");
        Ok(target)
    }
}

/// Addresses must be absolute http(s) URLs; they are kept in normalized form
/// so duplicates compare equal.
pub fn normalize_address(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidInput("target address must not be empty".into()));
    }
    let url = Url::parse(raw)
        .map_err(|e| Error::InvalidInput(format!("malformed address '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::InvalidInput(format!(
            "address '{raw}' must be an http(s) URL with a host"
        )));
    }
    Ok(url.to_string())
}
