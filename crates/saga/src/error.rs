//! Saga error types.

use common::OrderId;
use contracts::ContractError;
use messaging::TransportError;
use saga_store::StoreError;
use thiserror::Error;

/// Errors that can occur while handling saga messages.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The orchestrator does not consume this message type.
    #[error("Unsupported message type: {0}")]
    UnsupportedMessage(String),

    /// The saga kept changing underneath every reload.
    #[error("Gave up on saga {correlation_id} after {attempts} concurrency conflicts")]
    ConflictRetriesExhausted { correlation_id: OrderId, attempts: u32 },

    /// The transition table disagrees with the decision function.
    #[error("Invalid transition table: {0}")]
    InvalidTransitionTable(String),

    /// A participant could not carry out a request.
    #[error("Participant error: {0}")]
    Participant(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Message contract error.
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    /// Saga store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Message transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
