// src/pipeline.rs
//! Extraction–Classification Pipeline.
//!
//! Items move `discovered -> extracted -> classified | failed`. Extraction
//! and classification of one target run inside that target's exclusive
//! section, so concurrent passes cannot create duplicate items and a removal
//! waits for the pass to finish. Failures scoped to one thread end up in
//! that item's `failed` state; only errors about the target itself or the
//! store abort a pass. Items whose thread fetch failed are fetched again by
//! the next extraction pass that still lists their thread.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::error::{Error, Result};
use crate::metrics::ensure_metrics_described;
use crate::model::{Item, ItemStatus, Target, TargetId};
use crate::registry::TargetRegistry;
use crate::scrape::Scraper;

/// Result of one extraction pass.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub target_id: TargetId,
    /// Thread addresses found on the forum, known or new.
    pub discovered: usize,
    /// Items fetched by this pass, in `extracted` or `failed` state: new
    /// threads plus earlier fetch failures tried again.
    pub fetched: Vec<Item>,
    /// How many of `fetched` were earlier fetch failures.
    pub retried: usize,
}

pub struct Pipeline {
    registry: Arc<TargetRegistry>,
    scraper: Arc<dyn Scraper>,
    classifier: Arc<dyn Classifier>,
    fetch_timeout: Duration,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(
        registry: Arc<TargetRegistry>,
        scraper: Arc<dyn Scraper>,
        classifier: Arc<dyn Classifier>,
        fetch_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            scraper,
            classifier,
            fetch_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Discover the target's threads and fetch every one not seen before,
    /// along with listed threads whose earlier fetch failed.
    /// Fails with `TargetNotFound` before touching the network, and with an
    /// upstream error if the thread listing cannot be fetched.
    pub async fn extract(&self, target_id: &TargetId) -> Result<Extraction> {
        let _guard = self.registry.lock(target_id).await;
        let target = self.registry.get(target_id).await?;
        self.extract_locked(&target).await
    }

    /// Classify one `extracted` item and persist the result. A classifier
    /// error lands in the item as `failed`; only store errors are returned.
    pub async fn classify(&self, item: Item) -> Result<Item> {
        if item.status != ItemStatus::Extracted {
            return Err(Error::InvalidInput(format!(
                "item {} is {:?}, not awaiting classification",
                item.id, item.status
            )));
        }
        let item = self.judge(item).await;
        self.registry.store().update_item(item.clone()).await?;
        Ok(item)
    }

    /// Classify every item of the target still waiting in `extracted`.
    pub async fn classify_pending(&self, target_id: &TargetId) -> Result<Vec<Item>> {
        let _guard = self.registry.lock(target_id).await;
        self.registry.get(target_id).await?;
        self.classify_locked(target_id).await
    }

    /// Extract, then classify everything extracted, as one unit under the
    /// target's exclusive section. Returns the items this pass carried to a
    /// terminal state.
    pub async fn run_full_pass(&self, target_id: &TargetId) -> Result<Vec<Item>> {
        let _guard = self.registry.lock(target_id).await;
        let target = self.registry.get(target_id).await?;

        let extraction = self.extract_locked(&target).await?;
        let mut done: Vec<Item> = extraction
            .fetched
            .into_iter()
            .filter(|it| it.status == ItemStatus::Failed)
            .collect();
        done.extend(self.classify_locked(target_id).await?);

        info!(target_id = %target_id, items = done.len(), "full pass finished");
        Ok(done)
    }

    async fn extract_locked(&self, target: &Target) -> Result<Extraction> {
        ensure_metrics_described();
        let threads = tokio::time::timeout(
            self.fetch_timeout,
            self.scraper.enumerate_threads(&target.address),
        )
        .await
        .map_err(|_| Error::Timeout {
            address: target.address.clone(),
            after_secs: self.fetch_timeout.as_secs(),
        })??;
        let discovered = threads.len();

        let mut seen: HashSet<String> = HashSet::new();
        let mut refetch: HashMap<String, Item> = HashMap::new();
        for it in self.registry.store().list_items(&target.id).await? {
            if it.status == ItemStatus::Failed && it.fetch_failed {
                refetch.insert(it.thread_url.clone(), it);
            } else {
                seen.insert(it.thread_url);
            }
        }

        // (item, stored already)
        let mut pending: Vec<(Item, bool)> = Vec::new();
        for url in threads {
            if !seen.insert(url.clone()) {
                continue;
            }
            match refetch.remove(&url) {
                Some(mut it) => {
                    it.reopen_for_fetch();
                    pending.push((it, true));
                }
                None => pending.push((Item::discovered(target.id, url), false)),
            }
        }
        let retried = pending.iter().filter(|(_, stored)| *stored).count();
        debug!(
            target_id = %target.id,
            discovered,
            new = pending.len() - retried,
            retried,
            "thread listing fetched"
        );

        // Each item is persisted as soon as its fetch settles.
        let fetched: Vec<Item> = stream::iter(pending)
            .map(|(item, stored)| async move {
                let item = self.fetch_item(item).await;
                if stored {
                    self.registry.store().update_item(item.clone()).await?;
                } else {
                    self.registry.store().insert_item(item.clone()).await?;
                }
                Ok::<_, Error>(item)
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        info!(
            target_id = %target.id,
            discovered,
            fetched = fetched.len(),
            retried,
            "extraction finished"
        );
        Ok(Extraction {
            target_id: target.id,
            discovered,
            fetched,
            retried,
        })
    }

    async fn fetch_item(&self, mut item: Item) -> Item {
        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.scraper.fetch_thread_content(&item.thread_url),
        )
        .await
        .unwrap_or_else(|_| {
            Err(Error::Timeout {
                address: item.thread_url.clone(),
                after_secs: self.fetch_timeout.as_secs(),
            })
        });
        match fetched {
            Ok(content) => {
                item.mark_extracted(content);
                counter!("items_extracted_total").increment(1);
            }
            Err(e) => {
                warn!(target_id = %item.target_id, thread = %item.thread_url, error = %e, "thread fetch failed");
                counter!("item_fetch_failures_total").increment(1);
                item.mark_fetch_failed(&e);
            }
        }
        item
    }

    async fn classify_locked(&self, target_id: &TargetId) -> Result<Vec<Item>> {
        ensure_metrics_described();
        let pending: Vec<Item> = self
            .registry
            .store()
            .list_items(target_id)
            .await?
            .into_iter()
            .filter(|it| it.status == ItemStatus::Extracted)
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        // Results are written back as one batch.
        let classified: Vec<Item> = stream::iter(pending)
            .map(|it| self.judge(it))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        self.registry
            .store()
            .update_items(classified.clone())
            .await?;
        info!(target_id = %target_id, items = classified.len(), "classification finished");
        Ok(classified)
    }

    /// Run the classifier over one item. A classifier error lands in the
    /// item as `failed`.
    async fn judge(&self, mut item: Item) -> Item {
        match self.classifier.classify(&item.content).await {
            Ok(severity) => {
                item.mark_classified(severity);
                counter!("items_classified_total").increment(1);
                debug!(item_id = %item.id, severity = severity.as_str(), "item classified");
            }
            Err(e) => {
                counter!("classification_failures_total").increment(1);
                warn!(item_id = %item.id, thread = %item.thread_url, error = %e, "classification failed");
                item.mark_failed(e.to_string());
            }
        }
        item
    }
}
