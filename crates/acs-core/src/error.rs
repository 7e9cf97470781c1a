//! Error types shared across crates

use thiserror::Error;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors reported by a [`DeviceRepository`](crate::DeviceRepository) implementation
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Device is not registered
    #[error("Device not registered: {0}")]
    NotFound(String),

    /// Storage backend failed
    #[error("Storage error: {0}")]
    Storage(String),
}
