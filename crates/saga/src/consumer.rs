//! Bridges between the messaging consumer and the saga.

use async_trait::async_trait;
use contracts::MessageEnvelope;
use messaging::{DeadLetterSink, HandlerError, MessageHandler};
use saga_store::{FaultKind, FaultRecord, FaultStore, InboxStore, SagaStore};
use tracing::warn;

use crate::clock::Clock;
use crate::instance::OrderCheckoutSaga;
use crate::orchestrator::OrderCheckoutOrchestrator;
use crate::transitions::Trigger;

#[async_trait]
impl<St, C> MessageHandler for OrderCheckoutOrchestrator<St, C>
where
    St: SagaStore<OrderCheckoutSaga> + InboxStore,
    C: Clock,
{
    fn consumer_name(&self) -> &str {
        &self.config().consumer_name
    }

    /// Bus-delivered triggers. `SagaTimedOut` is fed in-process by the
    /// timeout monitor.
    fn message_types(&self) -> Vec<&'static str> {
        Trigger::ALL
            .into_iter()
            .filter(|t| *t != Trigger::SagaTimedOut)
            .map(|t| t.message_type())
            .collect()
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        OrderCheckoutOrchestrator::handle(self, envelope)
            .await
            .map(|_| ())
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}

/// Dead-letters exhausted deliveries into the fault store as poison
/// messages.
#[derive(Debug, Clone)]
pub struct StoreDeadLetters<F> {
    faults: F,
}

impl<F: FaultStore> StoreDeadLetters<F> {
    pub fn new(faults: F) -> Self {
        Self { faults }
    }
}

#[async_trait]
impl<F: FaultStore> DeadLetterSink for StoreDeadLetters<F> {
    async fn dead_letter(
        &self,
        consumer: &str,
        envelope: &MessageEnvelope,
        attempts: u32,
        reason: &str,
    ) -> Result<(), HandlerError> {
        let fault = FaultRecord::new(FaultKind::PoisonMessage, consumer, envelope, reason)
            .with_attempts(attempts);
        let parked = self
            .faults
            .park(fault)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        if parked {
            metrics::counter!("saga_faults_total", "kind" => FaultKind::PoisonMessage.as_str())
                .increment(1);
        } else {
            warn!(%consumer, message_id = %envelope.message_id, "poison message already parked");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SagaConfig;
    use common::{BasketId, Money, OrderId};
    use contracts::{DeleteBasketComplete, PlaceOrder};
    use messaging::{Consumer, ConsumerConfig, DeliveryOutcome, RetryPolicy};
    use saga_store::InMemorySagaStore;
    use std::sync::Arc;
    use std::time::Duration;

    type Store = InMemorySagaStore<OrderCheckoutSaga>;

    #[test]
    fn subscribes_to_bus_triggers_only() {
        let orch = OrderCheckoutOrchestrator::new(Store::new(), SagaConfig::default());
        assert_eq!(
            MessageHandler::message_types(&orch),
            vec!["UserCheckedOut", "DeleteBasketComplete", "DeleteBasketFailed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unconsumable_message_is_dead_lettered_as_poison() {
        let store = Store::new();
        let orch = Arc::new(OrderCheckoutOrchestrator::new(
            store.clone(),
            SagaConfig::default(),
        ));
        let consumer = Consumer::new(
            orch,
            Arc::new(StoreDeadLetters::new(store.clone())),
            ConsumerConfig {
                concurrency: 1,
                retry: RetryPolicy::default()
                    .with_max_attempts(3)
                    .with_initial_backoff(Duration::from_millis(5)),
            },
        );
        let envelope = MessageEnvelope::wrap(&PlaceOrder {
            basket_id: BasketId::new(),
            email: None,
            order_id: OrderId::new(),
            total_money: Money::from_cents(1),
        })
        .unwrap();

        let outcome = consumer.deliver(&envelope).await;

        assert_eq!(outcome, DeliveryOutcome::DeadLettered { attempts: 3 });
        let faults = store.faults_for(envelope.correlation_id).await.unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].kind, FaultKind::PoisonMessage);
        assert_eq!(faults[0].attempts, 3);
        assert_eq!(faults[0].consumer, "order-checkout-saga");
    }

    #[tokio::test(start_paused = true)]
    async fn misrouted_message_is_parked_with_the_mismatch_as_reason() {
        let store = Store::new();
        let orch = Arc::new(OrderCheckoutOrchestrator::new(
            store.clone(),
            SagaConfig::default(),
        ));
        let consumer = Consumer::new(
            orch,
            Arc::new(StoreDeadLetters::new(store.clone())),
            ConsumerConfig {
                concurrency: 1,
                retry: RetryPolicy::default()
                    .with_max_attempts(2)
                    .with_initial_backoff(Duration::from_millis(5)),
            },
        );
        let mut envelope = MessageEnvelope::wrap(&DeleteBasketComplete {
            order_id: OrderId::new(),
            total_money: Money::from_cents(1),
        })
        .unwrap();
        envelope.correlation_id = OrderId::new();

        let outcome = consumer.deliver(&envelope).await;

        assert_eq!(outcome, DeliveryOutcome::DeadLettered { attempts: 2 });
        let faults = store.faults_for(envelope.correlation_id).await.unwrap();
        assert_eq!(faults.len(), 1);
        assert!(faults[0].reason.contains("Correlation mismatch"));
    }
}
