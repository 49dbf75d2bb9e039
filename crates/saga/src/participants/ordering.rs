//! Ordering service fake.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{BasketId, Money, OrderId};
use contracts::{
    CancelOrder, CompleteOrder, IntegrationMessage, MessageEnvelope, OrderStatusChangedToCancel,
    OrderStatusChangedToComplete, UserCheckedOut,
};
use messaging::{HandlerError, MessageHandler};
use saga_store::{InboxStore, TransitionEffects};
use serde::Serialize;
use tracing::{debug, info};

use super::commit_once;
use crate::error::{Result, SagaError};

/// Lifecycle of an order as Ordering sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

/// Ordering's row for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub basket_id: BasketId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub total_money: Money,
    pub status: OrderStatus,
}

/// Records orders on checkout and finalizes them on `CompleteOrder` /
/// `CancelOrder`.
pub struct OrderingParticipant<St> {
    store: St,
    consumer_name: String,
    orders: Arc<RwLock<HashMap<OrderId, OrderRecord>>>,
}

impl<St: InboxStore> OrderingParticipant<St> {
    pub fn new(store: St) -> Self {
        Self {
            store,
            consumer_name: "ordering".to_string(),
            orders: Arc::default(),
        }
    }

    /// Records a pending order and enqueues `UserCheckedOut`.
    #[tracing::instrument(skip(self, full_name, email))]
    pub async fn checkout(
        &self,
        basket_id: BasketId,
        full_name: Option<String>,
        email: Option<String>,
        total_money: Money,
    ) -> Result<OrderId> {
        let order_id = OrderId::new();
        let event = UserCheckedOut {
            order_id,
            basket_id,
            full_name: full_name.clone(),
            email: email.clone(),
            total_money,
        };
        let envelope = MessageEnvelope::wrap(&event)?;

        self.write_orders()?.insert(
            order_id,
            OrderRecord {
                order_id,
                basket_id,
                full_name,
                email,
                total_money,
                status: OrderStatus::Pending,
            },
        );
        if let Err(e) = self
            .store
            .record_processed(TransitionEffects::new().with_outbox(envelope))
            .await
        {
            self.write_orders()?.remove(&order_id);
            return Err(e.into());
        }

        info!(%order_id, "checkout recorded");
        Ok(order_id)
    }

    pub fn order(&self, order_id: OrderId) -> Option<OrderRecord> {
        self.orders
            .read()
            .ok()
            .and_then(|orders| orders.get(&order_id).cloned())
    }

    pub fn order_status(&self, order_id: OrderId) -> Option<OrderStatus> {
        self.order(order_id).map(|o| o.status)
    }

    fn write_orders(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<OrderId, OrderRecord>>> {
        self.orders
            .write()
            .map_err(|_| SagaError::Participant("order table lock poisoned".to_string()))
    }

    async fn finalize(&self, envelope: &MessageEnvelope) -> Result<()> {
        if self
            .store
            .has_processed(&self.consumer_name, envelope.message_id)
            .await?
        {
            return Ok(());
        }

        let (order_id, target) = match envelope.message_type.as_str() {
            CompleteOrder::MESSAGE_TYPE => {
                let command: CompleteOrder = envelope.decode()?;
                (command.order_id, OrderStatus::Completed)
            }
            CancelOrder::MESSAGE_TYPE => {
                let command: CancelOrder = envelope.decode()?;
                (command.order_id, OrderStatus::Cancelled)
            }
            other => return Err(SagaError::UnsupportedMessage(other.to_string())),
        };

        let order = self
            .order(order_id)
            .ok_or_else(|| SagaError::Participant(format!("unknown order {order_id}")))?;

        let mut effects = TransitionEffects::processed(&self.consumer_name, envelope.message_id);
        if order.status == target {
            debug!(%order_id, status = ?target, "order already finalized");
        } else {
            let reply = match target {
                OrderStatus::Completed => MessageEnvelope::wrap_caused_by(
                    &OrderStatusChangedToComplete {
                        order_id,
                        basket_id: order.basket_id,
                        full_name: order.full_name.clone(),
                        email: order.email.clone(),
                        total_money: order.total_money,
                    },
                    envelope.message_id,
                )?,
                _ => MessageEnvelope::wrap_caused_by(
                    &OrderStatusChangedToCancel {
                        order_id,
                        basket_id: order.basket_id,
                        full_name: order.full_name.clone(),
                        email: order.email.clone(),
                        total_money: order.total_money,
                    },
                    envelope.message_id,
                )?,
            };
            effects = effects.with_outbox(reply);
        }

        if commit_once(&self.store, effects).await?
            && let Some(row) = self.write_orders()?.get_mut(&order_id)
        {
            row.status = target;
            info!(%order_id, status = ?target, "order finalized");
        }
        Ok(())
    }
}

#[async_trait]
impl<St: InboxStore> MessageHandler for OrderingParticipant<St> {
    fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    fn message_types(&self) -> Vec<&'static str> {
        vec![CompleteOrder::MESSAGE_TYPE, CancelOrder::MESSAGE_TYPE]
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> std::result::Result<(), HandlerError> {
        self.finalize(envelope)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::OrderCheckoutSaga;
    use saga_store::{InMemorySagaStore, OutboxStore};

    type Store = InMemorySagaStore<OrderCheckoutSaga>;

    async fn checked_out(store: &Store) -> (OrderingParticipant<Store>, OrderId) {
        let ordering = OrderingParticipant::new(store.clone());
        let order_id = ordering
            .checkout(
                BasketId::new(),
                Some("Alan Turing".into()),
                Some("alan@example.com".into()),
                Money::from_cents(1999),
            )
            .await
            .unwrap();
        (ordering, order_id)
    }

    #[tokio::test]
    async fn checkout_enqueues_user_checked_out() {
        let store = Store::new();
        let (ordering, order_id) = checked_out(&store).await;

        assert_eq!(ordering.order_status(order_id), Some(OrderStatus::Pending));
        let pending = store.pending(10).await.unwrap();
        let event: UserCheckedOut = pending[0].envelope.decode().unwrap();
        assert_eq!(event.order_id, order_id);
        assert_eq!(event.full_name.as_deref(), Some("Alan Turing"));
    }

    #[tokio::test]
    async fn complete_order_finalizes_and_announces() {
        let store = Store::new();
        let (ordering, order_id) = checked_out(&store).await;
        let command = MessageEnvelope::wrap(&CompleteOrder {
            order_id,
            email: None,
            total_money: Money::from_cents(1999),
        })
        .unwrap();

        MessageHandler::handle(&ordering, &command).await.unwrap();

        assert_eq!(ordering.order_status(order_id), Some(OrderStatus::Completed));
        let pending = store.pending(10).await.unwrap();
        let event: OrderStatusChangedToComplete = pending[1].envelope.decode().unwrap();
        assert_eq!(event.email.as_deref(), Some("alan@example.com"));
    }

    #[tokio::test]
    async fn repeated_cancel_is_a_no_op() {
        let store = Store::new();
        let (ordering, order_id) = checked_out(&store).await;
        let cancel = || {
            MessageEnvelope::wrap(&CancelOrder {
                order_id,
                full_name: None,
                email: None,
                total_money: Money::from_cents(1999),
            })
            .unwrap()
        };

        MessageHandler::handle(&ordering, &cancel()).await.unwrap();
        MessageHandler::handle(&ordering, &cancel()).await.unwrap();

        assert_eq!(ordering.order_status(order_id), Some(OrderStatus::Cancelled));
        let announced = store
            .pending(10)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.envelope.message_type == "OrderStatusChangedToCancel")
            .count();
        assert_eq!(announced, 1);
    }

    #[tokio::test]
    async fn unknown_order_is_an_error() {
        let store = Store::new();
        let ordering = OrderingParticipant::new(store);
        let command = MessageEnvelope::wrap(&CompleteOrder {
            order_id: OrderId::new(),
            email: None,
            total_money: Money::zero(),
        })
        .unwrap();

        assert!(MessageHandler::handle(&ordering, &command).await.is_err());
    }
}
