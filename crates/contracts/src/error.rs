//! Contract error types.

use common::OrderId;
use thiserror::Error;

/// Errors raised while building or decoding integration messages.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The envelope names a message type no contract is registered for.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// The envelope was decoded as the wrong contract.
    #[error("Message type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// The envelope was produced by a newer schema than this build understands.
    #[error("Unsupported schema version {found} for {message_type} (max {supported})")]
    UnsupportedVersion {
        message_type: String,
        found: u32,
        supported: u32,
    },

    /// The payload belongs to a different order than the envelope routes it to.
    #[error("Correlation mismatch: envelope routes to {envelope}, payload names {payload}")]
    CorrelationMismatch { envelope: OrderId, payload: OrderId },

    /// A required envelope field was not set on the builder.
    #[error("Missing envelope field: {0}")]
    MissingField(&'static str),

    /// The payload could not be (de)serialized.
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Result type for contract operations.
pub type Result<T> = std::result::Result<T, ContractError>;
