//! Basket service fake.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::BasketId;
use contracts::{
    DeleteBasketComplete, DeleteBasketFailed, IntegrationMessage, MessageEnvelope, PlaceOrder,
};
use messaging::{HandlerError, MessageHandler};
use saga_store::{InboxStore, TransitionEffects};
use tracing::info;

use super::commit_once;
use crate::error::Result;

#[derive(Debug, Default)]
struct BasketState {
    deleted: HashSet<BasketId>,
    failing: HashSet<BasketId>,
    fail_all: bool,
}

/// Clears the customer's basket on `PlaceOrder` and replies with exactly
/// one of `DeleteBasketComplete` or `DeleteBasketFailed`.
pub struct BasketParticipant<St> {
    store: St,
    consumer_name: String,
    state: Arc<RwLock<BasketState>>,
}

impl<St: InboxStore> BasketParticipant<St> {
    pub fn new(store: St) -> Self {
        Self {
            store,
            consumer_name: "basket".to_string(),
            state: Arc::default(),
        }
    }

    /// Makes deletion of one basket fail.
    pub fn set_fail_for(&self, basket_id: BasketId) {
        if let Ok(mut state) = self.state.write() {
            state.failing.insert(basket_id);
        }
    }

    /// Makes every deletion fail.
    pub fn set_fail_all(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_all = fail;
        }
    }

    /// Returns true if the basket was cleared.
    pub fn is_deleted(&self, basket_id: BasketId) -> bool {
        self.state
            .read()
            .map(|s| s.deleted.contains(&basket_id))
            .unwrap_or(false)
    }

    fn should_fail(&self, basket_id: BasketId) -> bool {
        self.state
            .read()
            .map(|s| s.fail_all || s.failing.contains(&basket_id))
            .unwrap_or(true)
    }

    async fn place_order(&self, envelope: &MessageEnvelope) -> Result<()> {
        if self
            .store
            .has_processed(&self.consumer_name, envelope.message_id)
            .await?
        {
            return Ok(());
        }
        let command: PlaceOrder = envelope.decode()?;
        let failed = self.should_fail(command.basket_id);

        let reply = if failed {
            MessageEnvelope::wrap_caused_by(
                &DeleteBasketFailed {
                    basket_id: command.basket_id,
                    email: command.email.clone(),
                    order_id: command.order_id,
                    total_money: command.total_money,
                },
                envelope.message_id,
            )?
        } else {
            MessageEnvelope::wrap_caused_by(
                &DeleteBasketComplete {
                    order_id: command.order_id,
                    total_money: command.total_money,
                },
                envelope.message_id,
            )?
        };

        let effects =
            TransitionEffects::processed(&self.consumer_name, envelope.message_id).with_outbox(reply);
        if commit_once(&self.store, effects).await?
            && !failed
            && let Ok(mut state) = self.state.write()
        {
            state.deleted.insert(command.basket_id);
        }

        info!(
            order_id = %command.order_id,
            basket_id = %command.basket_id,
            failed,
            "basket deletion handled"
        );
        Ok(())
    }
}

#[async_trait]
impl<St: InboxStore> MessageHandler for BasketParticipant<St> {
    fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    fn message_types(&self) -> Vec<&'static str> {
        vec![PlaceOrder::MESSAGE_TYPE]
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> std::result::Result<(), HandlerError> {
        self.place_order(envelope)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::OrderCheckoutSaga;
    use common::{Money, OrderId};
    use saga_store::{InMemorySagaStore, OutboxStore};

    type Store = InMemorySagaStore<OrderCheckoutSaga>;

    fn place_order(basket_id: BasketId) -> MessageEnvelope {
        MessageEnvelope::wrap(&PlaceOrder {
            basket_id,
            email: Some("e@x.com".into()),
            order_id: OrderId::new(),
            total_money: Money::from_cents(500),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn clears_basket_and_replies_complete() {
        let store = Store::new();
        let basket = BasketParticipant::new(store.clone());
        let basket_id = BasketId::new();
        let command = place_order(basket_id);

        MessageHandler::handle(&basket, &command).await.unwrap();

        assert!(basket.is_deleted(basket_id));
        let pending = store.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].envelope.message_type, "DeleteBasketComplete");
        assert_eq!(pending[0].envelope.causation_id, Some(command.message_id));
    }

    #[tokio::test]
    async fn injected_failure_replies_failed() {
        let store = Store::new();
        let basket = BasketParticipant::new(store.clone());
        let basket_id = BasketId::new();
        basket.set_fail_for(basket_id);

        MessageHandler::handle(&basket, &place_order(basket_id))
            .await
            .unwrap();

        assert!(!basket.is_deleted(basket_id));
        let pending = store.pending(10).await.unwrap();
        let failed: DeleteBasketFailed = pending[0].envelope.decode().unwrap();
        assert_eq!(failed.basket_id, basket_id);
        assert_eq!(failed.email.as_deref(), Some("e@x.com"));
    }

    #[tokio::test]
    async fn redelivery_replies_once() {
        let store = Store::new();
        let basket = BasketParticipant::new(store.clone());
        let command = place_order(BasketId::new());

        MessageHandler::handle(&basket, &command).await.unwrap();
        MessageHandler::handle(&basket, &command).await.unwrap();

        assert_eq!(store.pending_count().await.unwrap(), 1);
    }
}
