// tests/common/mod.rs
//
// Shared fixtures for the integration suites: a scripted in-memory scraper
// and helpers that wire an Orchestrator around it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use forum_recon::classify::{Classifier, KeywordClassifier};
use forum_recon::config::EngineConfig;
use forum_recon::model::{ForumEngine, Item, PageSnapshot, Target, TargetId, ThreadContent};
use forum_recon::scrape::{Scraper, Snapshot};
use forum_recon::store::{LocalStore, RecordStore};
use forum_recon::{Error, Orchestrator, Result};

#[derive(Default)]
struct Script {
    snapshot_fail: HashMap<String, Error>,
    snapshot_delay: HashMap<String, Duration>,
    threads: HashMap<String, Vec<String>>,
    listing_delay: Option<Duration>,
    contents: HashMap<String, Result<ThreadContent>>,
    content_delay: Option<Duration>,
}

/// Scraper whose answers are scripted per address. Unscripted listings are
/// unreachable; unscripted threads answer HTTP 404.
#[derive(Default)]
pub struct MockScraper {
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl MockScraper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Network calls made so far, of any kind.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_snapshot(&self, address: &str, err: Error) {
        self.script
            .lock()
            .unwrap()
            .snapshot_fail
            .insert(address.to_string(), err);
    }

    pub fn delay_snapshot(&self, address: &str, delay: Duration) {
        self.script
            .lock()
            .unwrap()
            .snapshot_delay
            .insert(address.to_string(), delay);
    }

    pub fn set_threads(&self, address: &str, urls: &[&str]) {
        self.script.lock().unwrap().threads.insert(
            address.to_string(),
            urls.iter().map(|u| u.to_string()).collect(),
        );
    }

    pub fn delay_listing(&self, delay: Duration) {
        self.script.lock().unwrap().listing_delay = Some(delay);
    }

    pub fn set_post(&self, url: &str, title: &str, body: &str) {
        self.script.lock().unwrap().contents.insert(
            url.to_string(),
            Ok(ThreadContent {
                title: title.to_string(),
                body: body.to_string(),
                author: "anon".to_string(),
                posted: "2024-05-01".to_string(),
            }),
        );
    }

    pub fn fail_post(&self, url: &str, err: Error) {
        self.script
            .lock()
            .unwrap()
            .contents
            .insert(url.to_string(), Err(err));
    }

    pub fn delay_posts(&self, delay: Duration) {
        self.script.lock().unwrap().content_delay = Some(delay);
    }
}

#[async_trait]
impl Scraper for MockScraper {
    async fn fetch_snapshot(&self, address: &str) -> Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, fail) = {
            let s = self.script.lock().unwrap();
            (
                s.snapshot_delay.get(address).copied(),
                s.snapshot_fail.get(address).cloned(),
            )
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if let Some(e) = fail {
            return Err(e);
        }
        let html = format!("<html id=\"XF\"><body>{address}</body></html>");
        Ok(Snapshot {
            page: PageSnapshot {
                digest: format!("digest-of-{address}"),
                html,
                screenshot: None,
            },
            engine: ForumEngine::XenForo,
        })
    }

    async fn enumerate_threads(&self, address: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, threads) = {
            let s = self.script.lock().unwrap();
            (s.listing_delay, s.threads.get(address).cloned())
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        threads.ok_or_else(|| Error::unreachable(address, "connection refused"))
    }

    async fn fetch_thread_content(&self, address: &str) -> Result<ThreadContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, content) = {
            let s = self.script.lock().unwrap();
            (s.content_delay, s.contents.get(address).cloned())
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        content.unwrap_or_else(|| Err(Error::unusable(address, "HTTP 404 Not Found")))
    }
}

/// In-memory store that can be told to fail reads, writes, or item inserts
/// past a budget. Counts item writes by kind.
pub struct FlakyStore {
    inner: LocalStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    insert_budget: Mutex<Option<usize>>,
    vanish_after_listing: Mutex<Option<TargetId>>,
    pub item_inserts: AtomicUsize,
    pub item_updates: AtomicUsize,
    pub batch_updates: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: LocalStore::in_memory(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            insert_budget: Mutex::new(None),
            vanish_after_listing: Mutex::new(None),
            item_inserts: AtomicUsize::new(0),
            item_updates: AtomicUsize::new(0),
            batch_updates: AtomicUsize::new(0),
        })
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Let `n` more item inserts through, then fail the rest.
    pub fn allow_item_inserts(&self, n: usize) {
        *self.insert_budget.lock().unwrap() = Some(n);
    }

    /// Delete `id` right after the next target listing, as if a concurrent
    /// caller removed it.
    pub fn vanish_after_listing(&self, id: TargetId) {
        *self.vanish_after_listing.lock().unwrap() = Some(id);
    }

    fn read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::storage("disk unavailable"));
        }
        Ok(())
    }

    fn write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage("disk full"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert_target(&self, target: Target) -> Result<()> {
        self.write()?;
        self.inner.insert_target(target).await
    }

    async fn get_target(&self, id: &TargetId) -> Result<Option<Target>> {
        self.read()?;
        self.inner.get_target(id).await
    }

    async fn list_targets(&self) -> Result<Vec<Target>> {
        self.read()?;
        let listed = self.inner.list_targets().await?;
        let vanish = self.vanish_after_listing.lock().unwrap().take();
        if let Some(id) = vanish {
            self.inner.delete_target(&id).await?;
        }
        Ok(listed)
    }

    async fn update_target(&self, target: Target) -> Result<()> {
        self.write()?;
        self.inner.update_target(target).await
    }

    async fn delete_target(&self, id: &TargetId) -> Result<usize> {
        self.write()?;
        self.inner.delete_target(id).await
    }

    async fn insert_item(&self, item: Item) -> Result<()> {
        self.write()?;
        let within_budget = {
            let mut budget = self.insert_budget.lock().unwrap();
            match budget.as_mut() {
                Some(0) => false,
                Some(left) => {
                    *left -= 1;
                    true
                }
                None => true,
            }
        };
        if !within_budget {
            return Err(Error::storage("disk full"));
        }
        self.item_inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_item(item).await
    }

    async fn update_item(&self, item: Item) -> Result<()> {
        self.write()?;
        self.item_updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_item(item).await
    }

    async fn update_items(&self, items: Vec<Item>) -> Result<()> {
        self.write()?;
        self.batch_updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_items(items).await
    }

    async fn list_items(&self, target_id: &TargetId) -> Result<Vec<Item>> {
        self.read()?;
        self.inner.list_items(target_id).await
    }
}

/// Defaults with short bounds and no backing file.
pub fn test_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.data_path = None;
    cfg.scan.timeout_secs = 30;
    cfg.extract.fetch_timeout_secs = 30;
    cfg.scan.concurrency = 4;
    cfg.extract.concurrency = 4;
    cfg
}

pub fn memory_store() -> Arc<dyn RecordStore> {
    Arc::new(LocalStore::in_memory())
}

pub fn orchestrator_with(scraper: Arc<MockScraper>, store: Arc<dyn RecordStore>) -> Arc<Orchestrator> {
    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::seeded().unwrap());
    Arc::new(Orchestrator::new(store, scraper, classifier, &test_config()))
}

pub fn orchestrator(scraper: Arc<MockScraper>) -> Arc<Orchestrator> {
    orchestrator_with(scraper, memory_store())
}
