//! Error types for cmdb-core

use std::path::PathBuf;

/// Result type for cmdb-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cmdb-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file not found at expected path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration could not be parsed or failed validation
    #[error("Invalid configuration at {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    #[error("Unsupported configuration format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// A construct or pass referenced a target that is not configured
    #[error("Unknown target: {name}")]
    UnknownTarget { name: String },

    /// Cached snapshot could not be read or written
    #[error("Snapshot error at {path}: {message}")]
    Snapshot { path: PathBuf, message: String },

    /// Another run holds the lock for this account and target
    #[error("Another run is in progress for {account}/{target}")]
    RunInProgress { account: String, target: String },

    // Transparent wrappers for underlying crate errors
    /// Host model error from cmdb-hosts
    #[error(transparent)]
    Hosts(#[from] cmdb_hosts::Error),

    /// Rule loading error from cmdb-rules
    #[error(transparent)]
    Rules(#[from] cmdb_rules::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
