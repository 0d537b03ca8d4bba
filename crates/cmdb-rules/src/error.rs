//! Error types for cmdb-rules

use std::path::PathBuf;

use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading rule documents
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read rules from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rules at {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported rule file format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("Invalid rule document: {message}")]
    InvalidDocument { message: String },
}

/// A single rule that could not be loaded
///
/// These are collected on the [`crate::RuleSet`] instead of failing the
/// whole load, so sibling rules keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("Rule #{index} '{rule}' rejected: {message}")]
pub struct ConfigurationError {
    /// Rule name, or `<unnamed>` when the definition has none
    pub rule: String,
    /// Position of the rule in its source document
    pub index: usize,
    pub message: String,
}
