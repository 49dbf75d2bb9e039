//! Periodic scan for sagas stuck waiting on the basket.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use contracts::{MessageEnvelope, SagaTimedOut};
use saga_store::{InboxStore, SagaStore};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::{Result, SagaError};
use crate::instance::OrderCheckoutSaga;
use crate::orchestrator::{HandleOutcome, OrderCheckoutOrchestrator};
use crate::state::SagaState;

/// Feeds `SagaTimedOut` to the orchestrator for sagas that stayed in
/// OrderPlaced longer than the configured timeout.
///
/// The timeout message goes through the normal handler, so a basket reply
/// racing the timer is resolved by the version check like any other pair of
/// concurrent messages.
pub struct SagaTimeoutMonitor<St, C> {
    orchestrator: Arc<OrderCheckoutOrchestrator<St, C>>,
    timeout: TimeDelta,
    check_interval: Duration,
    batch_size: usize,
}

impl<St, C> SagaTimeoutMonitor<St, C>
where
    St: SagaStore<OrderCheckoutSaga> + InboxStore,
    C: Clock,
{
    /// Builds a monitor from the orchestrator's config.
    ///
    /// Returns `Ok(None)` when no timeout is configured.
    pub fn from_config(orchestrator: Arc<OrderCheckoutOrchestrator<St, C>>) -> Result<Option<Self>> {
        let config = orchestrator.config().clone();
        let Some(timeout) = config.timeout else {
            return Ok(None);
        };
        let timeout = TimeDelta::from_std(timeout)
            .map_err(|e| SagaError::InvalidConfig(format!("saga timeout out of range: {e}")))?;

        Ok(Some(Self {
            orchestrator,
            timeout,
            check_interval: config.timeout_check_interval,
            batch_size: config.timeout_batch_size,
        }))
    }

    /// Times out every overdue saga found in one scan. Returns how many
    /// sagas changed state.
    pub async fn check_once(&self) -> Result<usize> {
        let now = self.orchestrator.clock().now();
        let overdue = self
            .orchestrator
            .store()
            .find_in_state(SagaState::OrderPlaced.as_str(), now - self.timeout, self.batch_size)
            .await?;

        let mut timed_out = 0;
        for (saga, _) in overdue {
            let placed_at = saga.order_placed_at.unwrap_or(saga.updated_at);
            let envelope = MessageEnvelope::wrap(&SagaTimedOut {
                order_id: saga.correlation_id,
                deadline: placed_at + self.timeout,
            })?;

            match self.orchestrator.handle(&envelope).await {
                Ok(HandleOutcome::Applied { to, .. }) => {
                    warn!(correlation_id = %saga.correlation_id, to = %to, "saga timed out");
                    timed_out += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(correlation_id = %saga.correlation_id, error = %e, "failed to time out saga");
                }
            }
        }

        Ok(timed_out)
    }

    /// Runs scans until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            timeout_secs = self.timeout.num_seconds(),
            check_interval_ms = self.check_interval.as_millis() as u64,
            action = %self.orchestrator.config().timeout_action,
            "saga timeout monitor started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {
                    if let Err(e) = self.check_once().await {
                        error!(error = %e, "timeout scan failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("saga timeout monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{SagaConfig, TimeoutAction};
    use common::{BasketId, Money, OrderId};
    use contracts::UserCheckedOut;
    use saga_store::{FaultKind, FaultStore, InMemorySagaStore, OutboxStore};

    type Store = InMemorySagaStore<OrderCheckoutSaga>;

    fn setup(
        action: TimeoutAction,
    ) -> (
        Arc<OrderCheckoutOrchestrator<Store, ManualClock>>,
        ManualClock,
    ) {
        let clock = ManualClock::default();
        let config = SagaConfig::default().with_timeout(Duration::from_secs(600), action);
        let orch = Arc::new(OrderCheckoutOrchestrator::with_clock(
            Store::new(),
            clock.clone(),
            config,
        ));
        (orch, clock)
    }

    async fn start(orch: &OrderCheckoutOrchestrator<Store, ManualClock>) -> OrderId {
        let order_id = OrderId::new();
        let envelope = MessageEnvelope::wrap(&UserCheckedOut {
            order_id,
            basket_id: BasketId::new(),
            full_name: None,
            email: Some("late@example.com".into()),
            total_money: Money::from_cents(999),
        })
        .unwrap();
        orch.handle(&envelope).await.unwrap();
        order_id
    }

    #[test]
    fn disabled_without_timeout() {
        let orch = Arc::new(OrderCheckoutOrchestrator::new(
            Store::new(),
            SagaConfig::default(),
        ));
        assert!(SagaTimeoutMonitor::from_config(orch).unwrap().is_none());
    }

    #[tokio::test]
    async fn fresh_sagas_are_left_alone() {
        let (orch, clock) = setup(TimeoutAction::Fault);
        let order_id = start(&orch).await;
        let monitor = SagaTimeoutMonitor::from_config(orch.clone()).unwrap().unwrap();

        clock.advance(TimeDelta::minutes(5));
        assert_eq!(monitor.check_once().await.unwrap(), 0);

        let (saga, _) = orch.saga(order_id).await.unwrap().unwrap();
        assert_eq!(saga.current_state, SagaState::OrderPlaced);
    }

    #[tokio::test]
    async fn overdue_saga_is_faulted() {
        let (orch, clock) = setup(TimeoutAction::Fault);
        let order_id = start(&orch).await;
        let monitor = SagaTimeoutMonitor::from_config(orch.clone()).unwrap().unwrap();

        clock.advance(TimeDelta::minutes(11));
        assert_eq!(monitor.check_once().await.unwrap(), 1);

        let (saga, _) = orch.saga(order_id).await.unwrap().unwrap();
        assert_eq!(saga.current_state, SagaState::Faulted);
        let faults = orch.store().faults_for(order_id).await.unwrap();
        assert_eq!(faults[0].kind, FaultKind::TimedOut);

        assert_eq!(monitor.check_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn overdue_saga_is_cancelled_when_configured() {
        let (orch, clock) = setup(TimeoutAction::Cancel);
        let order_id = start(&orch).await;
        let monitor = SagaTimeoutMonitor::from_config(orch.clone()).unwrap().unwrap();

        clock.advance(TimeDelta::minutes(11));
        monitor.check_once().await.unwrap();

        let (saga, _) = orch.saga(order_id).await.unwrap().unwrap();
        assert_eq!(saga.current_state, SagaState::Cancelled);
        let pending = orch.store().pending(10).await.unwrap();
        assert_eq!(pending.last().unwrap().envelope.message_type, "CancelOrder");
    }
}
