//! Error types for the basket engine.
//!
//! [`SyncError`] is the taxonomy every best-effort boundary classifies its
//! failures into before logging and discarding them (see [`crate::attempt`]).

use cmsg_core::UserId;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The medium cannot be reached (quota, disabled storage, dead worker).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock protecting in-memory storage was poisoned.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Errors raised by the catalog collaborator.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No basket exists for the owner.
    #[error("no basket for user {0}")]
    NotFound(UserId),

    /// The catalog could not be reached.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Failures inside the synchronization core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The persistence medium cannot be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    /// A stored or received payload is not a valid basket snapshot.
    #[error("invalid basket snapshot: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// The basket could not be encoded.
    #[error("failed to encode basket: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The initial basket fetch failed.
    #[error("catalog fetch failed: {0}")]
    CatalogFetch(#[from] CatalogError),

    /// Registering or unregistering for change notifications failed.
    #[error("subscription failed: {0}")]
    Subscription(String),
}

impl SyncError {
    /// Short, stable name for structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Deserialization(_) => "deserialization",
            Self::Serialization(_) => "serialization",
            Self::CatalogFetch(_) => "catalog_fetch",
            Self::Subscription(_) => "subscription",
        }
    }
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Unavailable("quota exceeded".to_string());
        assert_eq!(err.to_string(), "storage unavailable: quota exceeded");
    }

    #[test]
    fn test_sync_error_from_store_error() {
        let err = SyncError::from(StoreError::Poisoned);
        assert_eq!(err.kind(), "storage_unavailable");
        assert_eq!(err.to_string(), "storage unavailable: storage lock poisoned");
    }

    #[test]
    fn test_sync_error_from_catalog_error() {
        let err = SyncError::from(CatalogError::NotFound(UserId::new(7)));
        assert_eq!(err.kind(), "catalog_fetch");
        assert_eq!(err.to_string(), "catalog fetch failed: no basket for user 7");
    }

    #[test]
    fn test_subscription_kind() {
        let err = SyncError::Subscription("relay gone".to_string());
        assert_eq!(err.kind(), "subscription");
    }
}
