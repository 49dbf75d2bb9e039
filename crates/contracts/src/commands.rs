//! Integration commands issued by the checkout orchestrator.

use common::{BasketId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::message::IntegrationMessage;

/// Asks Basket to clear the cart backing a freshly placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub basket_id: BasketId,
    pub email: Option<String>,
    pub order_id: OrderId,
    pub total_money: Money,
}

impl IntegrationMessage for PlaceOrder {
    const MESSAGE_TYPE: &'static str = "PlaceOrder";

    fn correlation_id(&self) -> OrderId {
        self.order_id
    }

    fn basket_id(&self) -> Option<BasketId> {
        Some(self.basket_id)
    }
}

/// Asks Ordering to finalize the order as completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub order_id: OrderId,
    pub email: Option<String>,
    pub total_money: Money,
}

impl IntegrationMessage for CompleteOrder {
    const MESSAGE_TYPE: &'static str = "CompleteOrder";

    fn correlation_id(&self) -> OrderId {
        self.order_id
    }
}

/// Asks Ordering to cancel an order it already recorded as placed.
///
/// This is the compensating command of the checkout saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub total_money: Money,
}

impl IntegrationMessage for CancelOrder {
    const MESSAGE_TYPE: &'static str = "CancelOrder";

    fn correlation_id(&self) -> OrderId {
        self.order_id
    }
}
