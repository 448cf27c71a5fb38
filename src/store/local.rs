// src/store/local.rs
//! In-process record store, optionally mirrored to a JSON file.
//!
//! Every write rewrites the whole file, so one write costs time in
//! proportion to the store size. Batch item updates through
//! [`RecordStore::update_items`] where the caller can.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::RwLock};

use super::RecordStore;
use crate::error::{Error, Result};
use crate::model::{Item, Target, TargetId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Records {
    targets: Vec<Target>,
    items: Vec<Item>,
}

#[derive(Debug)]
pub struct LocalStore {
    records: RwLock<Records>,
    path: Option<PathBuf>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Records::default()),
            path: None,
        }
    }

    /// Open (or start) a store persisted at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::storage(format!("parsing {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::default(),
            Err(e) => return Err(Error::storage(format!("reading {}: {e}", path.display()))),
        };
        tracing::info!(
            path = %path.display(),
            targets = records.targets.len(),
            items = records.items.len(),
            "record store opened"
        );
        Ok(Self {
            records: RwLock::new(records),
            path: Some(path),
        })
    }

    /// Apply `f` atomically. With a backing file the change is staged on a
    /// copy and only committed once the file write succeeded.
    async fn mutate<T>(&self, f: impl FnOnce(&mut Records) -> Result<T>) -> Result<T> {
        let mut guard = self.records.write().await;
        match &self.path {
            None => f(&mut *guard),
            Some(path) => {
                let mut next = guard.clone();
                let out = f(&mut next)?;
                write_records(path, &next).await?;
                *guard = next;
                Ok(out)
            }
        }
    }
}

async fn write_records(path: &Path, records: &Records) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::storage(format!("creating {}: {e}", dir.display())))?;
    }
    let bytes = serde_json::to_vec_pretty(records).map_err(Error::storage)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| Error::storage(format!("writing {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::storage(format!("replacing {}: {e}", path.display())))
}

#[async_trait]
impl RecordStore for LocalStore {
    async fn insert_target(&self, target: Target) -> Result<()> {
        self.mutate(|r| {
            if r.targets.iter().any(|t| t.address == target.address) {
                return Err(Error::DuplicateAddress {
                    address: target.address.clone(),
                });
            }
            if r.targets.iter().any(|t| t.id == target.id) {
                return Err(Error::InvalidInput(format!(
                    "identifier {} already in use",
                    target.id
                )));
            }
            r.targets.push(target);
            Ok(())
        })
        .await
    }

    async fn get_target(&self, id: &TargetId) -> Result<Option<Target>> {
        let r = self.records.read().await;
        Ok(r.targets.iter().find(|t| t.id == *id).cloned())
    }

    async fn list_targets(&self) -> Result<Vec<Target>> {
        Ok(self.records.read().await.targets.clone())
    }

    async fn update_target(&self, target: Target) -> Result<()> {
        self.mutate(|r| {
            let slot = r
                .targets
                .iter_mut()
                .find(|t| t.id == target.id)
                .ok_or(Error::TargetNotFound(target.id))?;
            *slot = target;
            Ok(())
        })
        .await
    }

    async fn delete_target(&self, id: &TargetId) -> Result<usize> {
        self.mutate(|r| {
            let pos = r
                .targets
                .iter()
                .position(|t| t.id == *id)
                .ok_or(Error::TargetNotFound(*id))?;
            r.targets.remove(pos);
            let before = r.items.len();
            r.items.retain(|it| it.target_id != *id);
            Ok(before - r.items.len())
        })
        .await
    }

    async fn insert_item(&self, item: Item) -> Result<()> {
        self.mutate(|r| {
            if !r.targets.iter().any(|t| t.id == item.target_id) {
                return Err(Error::TargetNotFound(item.target_id));
            }
            r.items.push(item);
            Ok(())
        })
        .await
    }

    async fn update_item(&self, item: Item) -> Result<()> {
        self.mutate(|r| {
            let slot = r
                .items
                .iter_mut()
                .find(|it| it.id == item.id)
                .ok_or(Error::ItemNotFound(item.id))?;
            *slot = item;
            Ok(())
        })
        .await
    }

    /// All or nothing: one unknown id rejects the whole batch.
    async fn update_items(&self, items: Vec<Item>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.mutate(|r| {
            for item in &items {
                if !r.items.iter().any(|it| it.id == item.id) {
                    return Err(Error::ItemNotFound(item.id));
                }
            }
            for item in items {
                if let Some(slot) = r.items.iter_mut().find(|it| it.id == item.id) {
                    *slot = item;
                }
            }
            Ok(())
        })
        .await
    }

    async fn list_items(&self, target_id: &TargetId) -> Result<Vec<Item>> {
        let r = self.records.read().await;
        Ok(r.items
            .iter()
            .filter(|it| it.target_id == *target_id)
            .cloned()
            .collect())
    }
}
