//! Error types for cmdb-hosts

/// Result type for cmdb-hosts operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mutating or storing hosts
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Inventory updates must name the source they belong to
    #[error("Inventory key prefix must not be empty")]
    EmptyInventoryKey,

    /// Host lookup failed
    #[error("Host not found: {0}")]
    NotFound(String),

    /// Backing store failure reported by a [`crate::HostStore`] implementation
    #[error("Host store error: {message}")]
    Store { message: String },
}

impl Error {
    /// Create a store error with the given message
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}
