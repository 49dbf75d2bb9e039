//! Integration events: facts reported by a participant.

use chrono::{DateTime, Utc};
use common::{BasketId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::message::IntegrationMessage;

/// Ordering created an order from the customer's basket.
///
/// Starts a checkout saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCheckedOut {
    pub order_id: OrderId,
    pub basket_id: BasketId,
    #[serde(default)]
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub total_money: Money,
}

impl IntegrationMessage for UserCheckedOut {
    const MESSAGE_TYPE: &'static str = "UserCheckedOut";

    fn correlation_id(&self) -> OrderId {
        self.order_id
    }

    fn basket_id(&self) -> Option<BasketId> {
        Some(self.basket_id)
    }
}

/// Basket cleared the cart for the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBasketComplete {
    pub order_id: OrderId,
    pub total_money: Money,
}

impl IntegrationMessage for DeleteBasketComplete {
    const MESSAGE_TYPE: &'static str = "DeleteBasketComplete";

    fn correlation_id(&self) -> OrderId {
        self.order_id
    }
}

/// Basket could not clear the cart for the order.
///
/// A business outcome, not a transport error: it drives the compensating
/// edge of the saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBasketFailed {
    pub basket_id: BasketId,
    pub email: Option<String>,
    pub order_id: OrderId,
    pub total_money: Money,
}

impl IntegrationMessage for DeleteBasketFailed {
    const MESSAGE_TYPE: &'static str = "DeleteBasketFailed";

    fn correlation_id(&self) -> OrderId {
        self.order_id
    }

    fn basket_id(&self) -> Option<BasketId> {
        Some(self.basket_id)
    }
}

/// Ordering moved the order to Completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedToComplete {
    pub order_id: OrderId,
    pub basket_id: BasketId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub total_money: Money,
}

impl IntegrationMessage for OrderStatusChangedToComplete {
    const MESSAGE_TYPE: &'static str = "OrderStatusChangedToComplete";

    fn correlation_id(&self) -> OrderId {
        self.order_id
    }

    fn basket_id(&self) -> Option<BasketId> {
        Some(self.basket_id)
    }
}

/// Ordering moved the order to Cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedToCancel {
    pub order_id: OrderId,
    pub basket_id: BasketId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub total_money: Money,
}

impl IntegrationMessage for OrderStatusChangedToCancel {
    const MESSAGE_TYPE: &'static str = "OrderStatusChangedToCancel";

    fn correlation_id(&self) -> OrderId {
        self.order_id
    }

    fn basket_id(&self) -> Option<BasketId> {
        Some(self.basket_id)
    }
}

/// A saga stayed in a waiting state past its configured deadline.
///
/// Emitted in-process by the timeout monitor, never by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaTimedOut {
    pub order_id: OrderId,
    pub deadline: DateTime<Utc>,
}

impl IntegrationMessage for SagaTimedOut {
    const MESSAGE_TYPE: &'static str = "SagaTimedOut";

    fn correlation_id(&self) -> OrderId {
        self.order_id
    }
}
