// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod api;
pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod facade;
pub mod locks;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod scrape;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::EngineConfig;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::facade::{BatchReport, Orchestrator, ServiceError};

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::classify::{Classifier, KeywordClassifier, KeywordTable};
use crate::scrape::{HttpScraper, Scraper};
use crate::store::{LocalStore, RecordStore};

/// Wire the production collaborators described by `cfg` into an
/// [`Orchestrator`].
pub async fn build_orchestrator(cfg: &EngineConfig) -> anyhow::Result<Arc<Orchestrator>> {
    let store: Arc<dyn RecordStore> = match &cfg.data_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("creating data dir {}", dir.display()))?;
            }
            Arc::new(
                LocalStore::open(path)
                    .await
                    .with_context(|| format!("opening record store {}", path.display()))?,
            )
        }
        None => {
            info!("no data_path configured, records are kept in memory only");
            Arc::new(LocalStore::in_memory())
        }
    };

    let scraper: Arc<dyn Scraper> = Arc::new(HttpScraper::new(&cfg.http)?);

    let table = match &cfg.classifier.keywords_path {
        Some(p) => KeywordTable::load_from(p)?,
        None => KeywordTable::default_seed(),
    };
    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::new(&table)?);

    Ok(Arc::new(Orchestrator::new(store, scraper, classifier, cfg)))
}
