use common::{MessageId, OrderId};
use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the saga store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No saga exists for the correlation id.
    #[error("Saga not found: {0}")]
    NotFound(OrderId),

    /// A saga with this correlation id was created concurrently.
    #[error("Saga already exists: {0}")]
    AlreadyExists(OrderId),

    /// The saga moved on since it was loaded.
    #[error(
        "Concurrency conflict for saga {correlation_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        correlation_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The consumer already processed this message.
    #[error("Message {message_id} already processed by {consumer}")]
    DuplicateMessage {
        consumer: String,
        message_id: MessageId,
    },

    /// A stored value could not be interpreted.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the caller should reload the saga and recompute.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::AlreadyExists(_)
        )
    }
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_classified() {
        let id = OrderId::new();
        assert!(StoreError::AlreadyExists(id).is_conflict());
        assert!(
            StoreError::ConcurrencyConflict {
                correlation_id: id,
                expected: Version::initial(),
                actual: Version::new(1),
            }
            .is_conflict()
        );
        assert!(!StoreError::NotFound(id).is_conflict());
    }
}
