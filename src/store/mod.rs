// src/store/mod.rs
pub mod local;

use crate::error::Result;
use crate::model::{Item, Target, TargetId};

pub use local::LocalStore;

/// Durable record store for targets and their items.
///
/// Every call is atomic. Implementations enforce the record invariants:
/// unique target addresses, items only for existing targets, and cascading
/// item removal with their target.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Fails with `DuplicateAddress` if the address is taken.
    async fn insert_target(&self, target: Target) -> Result<()>;
    async fn get_target(&self, id: &TargetId) -> Result<Option<Target>>;
    /// All targets in insertion order.
    async fn list_targets(&self) -> Result<Vec<Target>>;
    async fn update_target(&self, target: Target) -> Result<()>;
    /// Removes the target and all its items; returns the number of items removed.
    async fn delete_target(&self, id: &TargetId) -> Result<usize>;

    /// Fails with `TargetNotFound` if the owner does not exist.
    async fn insert_item(&self, item: Item) -> Result<()>;
    async fn update_item(&self, item: Item) -> Result<()>;

    /// Replace several items at once. Stores that can apply the batch as one
    /// write should override this.
    async fn update_items(&self, items: Vec<Item>) -> Result<()> {
        for item in items {
            self.update_item(item).await?;
        }
        Ok(())
    }
    async fn list_items(&self, target_id: &TargetId) -> Result<Vec<Item>>;
}
