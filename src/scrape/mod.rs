// src/scrape/mod.rs
pub mod html;
pub mod http;

use crate::error::Result;
use crate::model::{ForumEngine, PageSnapshot, ThreadContent};

pub use http::HttpScraper;

/// A captured landing page plus the engine detected on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub page: PageSnapshot,
    pub engine: ForumEngine,
}

/// Network access to forums. All failures are upstream errors.
#[async_trait::async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch_snapshot(&self, address: &str) -> Result<Snapshot>;
    /// Absolute thread addresses linked from the forum at `address`.
    async fn enumerate_threads(&self, address: &str) -> Result<Vec<String>>;
    async fn fetch_thread_content(&self, address: &str) -> Result<ThreadContent>;
}
