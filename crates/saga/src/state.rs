//! Saga state machine states.

use serde::{Deserialize, Serialize};

/// The state of an order checkout saga.
///
/// ```text
/// NotStarted ──► OrderPlaced ──┬──► Completed
///                              ├──► Cancelled
///                              └──► Faulted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// No checkout seen yet. Never persisted.
    #[default]
    NotStarted,

    /// PlaceOrder was sent; waiting for the basket reply.
    OrderPlaced,

    /// The basket was cleared and CompleteOrder sent (terminal state).
    Completed,

    /// The order was compensated with CancelOrder (terminal state).
    Cancelled,

    /// The saga was abandoned after a timeout (terminal state).
    Faulted,
}

impl SagaState {
    /// Every state, in lifecycle order.
    pub const ALL: [SagaState; 5] = [
        SagaState::NotStarted,
        SagaState::OrderPlaced,
        SagaState::Completed,
        SagaState::Cancelled,
        SagaState::Faulted,
    ];

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Cancelled | SagaState::Faulted
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::OrderPlaced => "OrderPlaced",
            SagaState::Completed => "Completed",
            SagaState::Cancelled => "Cancelled",
            SagaState::Faulted => "Faulted",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_not_started() {
        assert_eq!(SagaState::default(), SagaState::NotStarted);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaState::NotStarted.is_terminal());
        assert!(!SagaState::OrderPlaced.is_terminal());
        assert!(SagaState::Completed.is_terminal());
        assert!(SagaState::Cancelled.is_terminal());
        assert!(SagaState::Faulted.is_terminal());
    }

    #[test]
    fn test_display() {
        for state in SagaState::ALL {
            assert_eq!(state.to_string(), state.as_str());
        }
        assert_eq!(SagaState::OrderPlaced.to_string(), "OrderPlaced");
    }

    #[test]
    fn test_serialization() {
        let state = SagaState::OrderPlaced;
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, "\"OrderPlaced\"");
        let deserialized: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
