// src/classify/mod.rs
pub mod keywords;

use crate::error::Result;
use crate::model::{Severity, ThreadContent};

pub use keywords::{KeywordClassifier, KeywordTable};

/// Assigns a severity bucket to post content. Fails with `Unclassifiable`
/// when the content cannot be judged.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, content: &ThreadContent) -> Result<Severity>;
}
