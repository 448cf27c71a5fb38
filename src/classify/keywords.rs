// src/classify/keywords.rs
//! Keyword severity classifier.
//!
//! Each bucket is a list of phrases matched case-insensitively on word
//! boundaries; inner whitespace in a phrase matches any whitespace run.
//! Buckets are checked from `high` down to `low` and the first hit wins.
//! Text without any hit stays `unassigned`.
//!
//! The table loads from TOML or JSON:
//! ```toml
//! high = ["exploit", "botnet"]
//! medium = ["phishing"]
//! low = ["pirated"]
//! ```

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::Classifier;
use crate::error::{Error, Result};
use crate::model::{Severity, ThreadContent};

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct KeywordTable {
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

impl KeywordTable {
    pub fn default_seed() -> Self {
        fn v(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }
        Self {
            high: v(&[
                "turkey",
                "turkish",
                "tr",
                "turknet",
                "turkcell",
                "kablonet",
                "hacking",
                "hijacking",
                "breaching",
                "cracking",
                "vulnerability",
                "exploit",
                "attack",
                "malware",
                "botnet",
                "source code",
            ]),
            medium: v(&["phishing", "scam", "otp code", "qr code scanner"]),
            low: v(&["card", "cc", "pirated"]),
        }
    }

    /// Load from an explicit path. `.json` files parse as JSON, anything else
    /// as TOML.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading keyword table from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let table: KeywordTable = if ext == "json" {
            serde_json::from_str(&content).context("parsing keyword table JSON")?
        } else {
            toml::from_str(&content).context("parsing keyword table TOML")?
        };
        if table.high.is_empty() && table.medium.is_empty() && table.low.is_empty() {
            return Err(anyhow!("keyword table {} has no keywords", path.display()));
        }
        Ok(table)
    }
}

#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    // Highest severity first.
    buckets: Vec<(Severity, Regex)>,
}

impl KeywordClassifier {
    pub fn new(table: &KeywordTable) -> anyhow::Result<Self> {
        let mut buckets = Vec::new();
        for (severity, words) in [
            (Severity::High, &table.high),
            (Severity::Medium, &table.medium),
            (Severity::Low, &table.low),
        ] {
            if let Some(re) = compile_bucket(words)? {
                buckets.push((severity, re));
            }
        }
        Ok(Self { buckets })
    }

    /// Classifier over the built-in keyword lists.
    pub fn seeded() -> anyhow::Result<Self> {
        Self::new(&KeywordTable::default_seed())
    }

    pub fn severity_of(&self, text: &str) -> Severity {
        self.buckets
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(s, _)| *s)
            .unwrap_or(Severity::Unassigned)
    }
}

fn compile_bucket(words: &[String]) -> anyhow::Result<Option<Regex>> {
    let alts: Vec<String> = words
        .iter()
        .map(|w| {
            w.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .filter(|p| !p.is_empty())
        .collect();
    if alts.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?i)\b(?:{})\b", alts.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .with_context(|| format!("compiling keyword pattern {pattern}"))
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, content: &ThreadContent) -> Result<Severity> {
        let text = content.classification_text();
        if text.trim().is_empty() {
            return Err(Error::Unclassifiable("post has no text".into()));
        }
        Ok(self.severity_of(&text))
    }
}
