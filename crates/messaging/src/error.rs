use thiserror::Error;

/// Errors raised by a message transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The broker could not be reached or refused the message. Transient.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The transport has been shut down.
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
