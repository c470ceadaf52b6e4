//! Error types for todo-sync.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Remote(#[from] RemoteError),

    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Remote collection failures.
///
/// Every transport or HTTP failure collapses into the variant for the
/// operation that was attempted. The display text is what the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Error fetching todos")]
    Fetch,

    #[error("Error adding todo")]
    Add,

    #[error("Error editing todo")]
    Edit,

    #[error("Error toggling todo")]
    Toggle,

    #[error("Error deleting todo")]
    Delete,
}

/// Local persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the store before touching the network.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Result type alias for todo-sync.
pub type Result<T> = std::result::Result<T, Error>;
