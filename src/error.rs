// src/error.rs
//! Typed errors for the orchestration engine.
//!
//! Internal variants keep the detail needed for logs; [`Error::kind`] folds
//! them into the caller-facing [`ErrorKind`] taxonomy.

use serde::{ser::SerializeStruct, Serialize, Serializer};
use thiserror::Error;

use crate::model::{ItemId, TargetId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Caller-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Upstream,
    Classification,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Classification => "classification",
            ErrorKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed caller input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a target with address {address} is already registered")]
    DuplicateAddress { address: String },

    #[error("target not found: {0}")]
    TargetNotFound(TargetId),

    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// Transport-level failure reaching the address
    #[error("unreachable {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("timed out after {after_secs}s fetching {address}")]
    Timeout { address: String, after_secs: u64 },

    /// Reachable, but the response cannot be used
    #[error("unusable content from {address}: {reason}")]
    UnusableContent { address: String, reason: String },

    #[error("content could not be classified: {0}")]
    Unclassifiable(String),

    #[error("record store unavailable: {0}")]
    Storage(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::Validation,
            Error::DuplicateAddress { .. } => ErrorKind::Conflict,
            Error::TargetNotFound(_) | Error::ItemNotFound(_) => ErrorKind::NotFound,
            Error::Unreachable { .. } | Error::Timeout { .. } | Error::UnusableContent { .. } => {
                ErrorKind::Upstream
            }
            Error::Unclassifiable(_) => ErrorKind::Classification,
            Error::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }

    pub fn unreachable(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Unreachable {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unusable(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::UnusableContent {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}

// Outcomes embed errors, so they serialize as `{kind, message}`.
impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("Error", 2)?;
        st.serialize_field("kind", &self.kind())?;
        st.serialize_field("message", &self.to_string())?;
        st.end()
    }
}
