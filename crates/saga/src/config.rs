//! Orchestrator configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to a saga that stays in OrderPlaced past its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Move to Faulted and park a fault record for an operator.
    #[default]
    Fault,
    /// Compensate with CancelOrder, like a basket failure.
    Cancel,
}

impl TimeoutAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fault => "fault",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for TimeoutAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeoutAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fault" => Ok(Self::Fault),
            "cancel" => Ok(Self::Cancel),
            other => Err(format!(
                "invalid timeout action '{other}', expected 'fault' or 'cancel'"
            )),
        }
    }
}

/// Settings for [`OrderCheckoutOrchestrator`](crate::OrderCheckoutOrchestrator)
/// and its timeout monitor.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Inbox namespace of the orchestrator.
    pub consumer_name: String,
    /// How long a saga may wait in OrderPlaced. `None` disables timeouts.
    pub timeout: Option<Duration>,
    pub timeout_action: TimeoutAction,
    /// How often the timeout monitor scans for overdue sagas.
    pub timeout_check_interval: Duration,
    /// Maximum overdue sagas handled per scan.
    pub timeout_batch_size: usize,
    /// Reload-and-recompute attempts after a version conflict.
    pub max_conflict_retries: u32,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            consumer_name: "order-checkout-saga".to_string(),
            timeout: None,
            timeout_action: TimeoutAction::default(),
            timeout_check_interval: Duration::from_secs(30),
            timeout_batch_size: 100,
            max_conflict_retries: 5,
        }
    }
}

impl SagaConfig {
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration, action: TimeoutAction) -> Self {
        self.timeout = Some(timeout);
        self.timeout_action = action;
        self
    }

    pub fn with_timeout_check_interval(mut self, interval: Duration) -> Self {
        self.timeout_check_interval = interval;
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_off_by_default() {
        let config = SagaConfig::default();
        assert!(config.timeout.is_none());
        assert_eq!(config.timeout_action, TimeoutAction::Fault);
    }

    #[test]
    fn timeout_action_parses_case_insensitively() {
        assert_eq!("Cancel".parse::<TimeoutAction>(), Ok(TimeoutAction::Cancel));
        assert_eq!(" fault ".parse::<TimeoutAction>(), Ok(TimeoutAction::Fault));
        assert!("retry".parse::<TimeoutAction>().is_err());
    }

    #[test]
    fn builder_sets_timeout_and_action() {
        let config = SagaConfig::default().with_timeout(Duration::from_secs(60), TimeoutAction::Cancel);
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.timeout_action, TimeoutAction::Cancel);
    }
}
