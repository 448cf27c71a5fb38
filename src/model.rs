// src/model.rs
//! Records the engine manages: targets, items, and the derived views built
//! on top of them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, ErrorKind};

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| Error::InvalidInput(format!("malformed identifier '{s}'")))
            }
        }
    };
}

opaque_id!(TargetId);
opaque_id!(ItemId);

/// Forum software detected from a captured page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForumEngine {
    XenForo,
    MyBB,
    WordPress,
    Machina,
    #[serde(rename = "RansomEXX-Custom")]
    RansomExxCustom,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub html: String,
    /// Reference to a visual capture, when the scraper produced one.
    pub screenshot: Option<String>,
    /// Hex SHA-256 of `html`.
    pub digest: String,
}

/// One forum/source under management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub address: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub snapshot: Option<PageSnapshot>,
    pub engine: Option<ForumEngine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Unassigned,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Unassigned => "unassigned",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Per-item lifecycle: `discovered -> extracted -> classified | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Discovered,
    Extracted,
    Classified,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Classified | ItemStatus::Failed)
    }

    pub fn can_advance_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Discovered, Extracted) | (Discovered, Failed) | (Extracted, Classified) | (Extracted, Failed)
        )
    }
}

/// Fields scraped from a single thread page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadContent {
    pub title: String,
    pub body: String,
    pub author: String,
    /// Origination date as published by the forum (format varies per engine).
    pub posted: String,
}

impl ThreadContent {
    /// Text handed to the classifier.
    pub fn classification_text(&self) -> String {
        match (self.title.trim(), self.body.trim()) {
            ("", body) => body.to_string(),
            (title, "") => title.to_string(),
            (title, body) => format!("{title}\n{body}"),
        }
    }
}

/// One discovered post belonging to exactly one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub target_id: TargetId,
    pub thread_url: String,
    pub status: ItemStatus,
    pub severity: Severity,
    #[serde(flatten)]
    pub content: ThreadContent,
    /// Why the item ended in `failed`.
    pub failure: Option<String>,
    /// The failure was an upstream error while fetching the thread.
    #[serde(default)]
    pub fetch_failed: bool,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn discovered(target_id: TargetId, thread_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            target_id,
            thread_url: thread_url.into(),
            status: ItemStatus::Discovered,
            severity: Severity::Unassigned,
            content: ThreadContent::default(),
            failure: None,
            fetch_failed: false,
            discovered_at: now,
            updated_at: now,
        }
    }

    fn advance(&mut self, next: ItemStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    pub fn mark_extracted(&mut self, content: ThreadContent) -> bool {
        if !self.advance(ItemStatus::Extracted) {
            return false;
        }
        self.content = content;
        true
    }

    pub fn mark_classified(&mut self, severity: Severity) -> bool {
        if !self.advance(ItemStatus::Classified) {
            return false;
        }
        self.severity = severity;
        true
    }

    /// Severity stays `unassigned` on failure.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if !self.advance(ItemStatus::Failed) {
            return false;
        }
        self.failure = Some(reason.into());
        true
    }

    /// Fail the item because its thread could not be fetched. Upstream
    /// failures leave the item eligible for [`Item::reopen_for_fetch`].
    pub fn mark_fetch_failed(&mut self, err: &Error) -> bool {
        if !self.mark_failed(err.to_string()) {
            return false;
        }
        self.fetch_failed = err.kind() == ErrorKind::Upstream;
        true
    }

    /// Send an item whose fetch failed back to `discovered`. Any other item
    /// is left alone.
    pub fn reopen_for_fetch(&mut self) -> bool {
        if self.status != ItemStatus::Failed || !self.fetch_failed {
            return false;
        }
        self.status = ItemStatus::Discovered;
        self.failure = None;
        self.fetch_failed = false;
        self.updated_at = Utc::now();
        true
    }
}

/// Transient result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub target_id: TargetId,
    pub address: String,
    pub success: bool,
    pub error: Option<Error>,
    /// Items discovered or extracted, for operations that produce any.
    pub items: Option<usize>,
    pub elapsed_ms: u64,
}

impl ScanOutcome {
    pub fn succeeded(target_id: TargetId, address: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            target_id,
            address: address.into(),
            success: true,
            error: None,
            items: None,
            elapsed_ms,
        }
    }

    pub fn failed(
        target_id: TargetId,
        address: impl Into<String>,
        error: Error,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            target_id,
            address: address.into(),
            success: false,
            error: Some(error),
            items: None,
            elapsed_ms,
        }
    }

    /// Attach the number of items the operation discovered.
    pub fn with_items(mut self, n: usize) -> Self {
        self.items = Some(n);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub unassigned: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Unassigned => self.unassigned += 1,
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
        }
    }

    pub fn sum(&self) -> usize {
        self.unassigned + self.low + self.medium + self.high
    }
}

impl<'a> FromIterator<&'a Item> for SeverityCounts {
    fn from_iter<I: IntoIterator<Item = &'a Item>>(iter: I) -> Self {
        let mut counts = SeverityCounts::default();
        for it in iter {
            counts.record(it.severity);
        }
        counts
    }
}

/// Severity distribution for one target, recomputed on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeveritySummary {
    pub target_id: TargetId,
    pub name: String,
    pub address: String,
    pub last_scanned_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counts: SeverityCounts,
    pub total: usize,
}
