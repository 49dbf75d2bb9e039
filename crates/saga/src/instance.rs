//! Persistent state of one order checkout.

use chrono::{DateTime, Utc};
use common::{BasketId, Money, OrderId};
use contracts::{CancelOrder, CompleteOrder, PlaceOrder, UserCheckedOut};
use saga_store::SagaData;
use serde::{Deserialize, Serialize};

use crate::state::SagaState;

/// The saga type identifier for order checkout.
pub const SAGA_TYPE: &str = "OrderCheckout";

/// Durable record of one checkout, keyed by its OrderId.
///
/// Customer details are captured from `UserCheckedOut` so that
/// `CompleteOrder` and `CancelOrder` can be built without asking Ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCheckoutSaga {
    pub correlation_id: OrderId,
    pub basket_id: BasketId,
    pub customer_full_name: Option<String>,
    pub customer_email: Option<String>,
    pub total_money: Money,
    pub current_state: SagaState,
    pub order_placed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fault_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl OrderCheckoutSaga {
    /// A not-yet-started instance seeded from the checkout event.
    pub fn start(event: &UserCheckedOut, now: DateTime<Utc>) -> Self {
        Self {
            correlation_id: event.order_id,
            basket_id: event.basket_id,
            customer_full_name: event.full_name.clone(),
            customer_email: event.email.clone(),
            total_money: event.total_money,
            current_state: SagaState::NotStarted,
            order_placed_at: None,
            finished_at: None,
            fault_reason: None,
            updated_at: now,
        }
    }

    /// Moves to `to`, stamping the lifecycle timestamps.
    ///
    /// The caller is responsible for only passing states reachable from the
    /// current one.
    pub fn transition_to(&mut self, to: SagaState, now: DateTime<Utc>) {
        if to == SagaState::OrderPlaced {
            self.order_placed_at = Some(now);
        }
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        self.current_state = to;
        self.updated_at = now;
    }

    /// Moves to Faulted, recording why.
    pub fn fault(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.fault_reason = Some(reason.into());
        self.transition_to(SagaState::Faulted, now);
    }

    pub fn place_order(&self) -> PlaceOrder {
        PlaceOrder {
            basket_id: self.basket_id,
            email: self.customer_email.clone(),
            order_id: self.correlation_id,
            total_money: self.total_money,
        }
    }

    pub fn complete_order(&self) -> CompleteOrder {
        CompleteOrder {
            order_id: self.correlation_id,
            email: self.customer_email.clone(),
            total_money: self.total_money,
        }
    }

    pub fn cancel_order(&self) -> CancelOrder {
        CancelOrder {
            order_id: self.correlation_id,
            full_name: self.customer_full_name.clone(),
            email: self.customer_email.clone(),
            total_money: self.total_money,
        }
    }
}

impl SagaData for OrderCheckoutSaga {
    const SAGA_TYPE: &'static str = SAGA_TYPE;

    fn correlation_id(&self) -> OrderId {
        self.correlation_id
    }

    fn state_name(&self) -> &'static str {
        self.current_state.as_str()
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkout() -> UserCheckedOut {
        UserCheckedOut {
            order_id: OrderId::new(),
            basket_id: BasketId::new(),
            full_name: Some("Ada Lovelace".into()),
            email: Some("ada@example.com".into()),
            total_money: Money::from_cents(4250),
        }
    }

    #[test]
    fn start_copies_checkout_details() {
        let event = checkout();
        let now = Utc::now();
        let saga = OrderCheckoutSaga::start(&event, now);

        assert_eq!(saga.correlation_id, event.order_id);
        assert_eq!(saga.basket_id, event.basket_id);
        assert_eq!(saga.customer_email.as_deref(), Some("ada@example.com"));
        assert_eq!(saga.current_state, SagaState::NotStarted);
        assert!(saga.order_placed_at.is_none());
    }

    #[test]
    fn transitions_stamp_timestamps() {
        let mut saga = OrderCheckoutSaga::start(&checkout(), Utc::now());
        let placed = Utc::now();
        saga.transition_to(SagaState::OrderPlaced, placed);
        assert_eq!(saga.order_placed_at, Some(placed));
        assert!(saga.finished_at.is_none());

        let done = Utc::now();
        saga.transition_to(SagaState::Completed, done);
        assert_eq!(saga.finished_at, Some(done));
        assert_eq!(saga.updated_at, done);
        assert_eq!(saga.state_name(), "Completed");
    }

    #[test]
    fn fault_records_reason() {
        let mut saga = OrderCheckoutSaga::start(&checkout(), Utc::now());
        saga.transition_to(SagaState::OrderPlaced, Utc::now());
        saga.fault("no basket reply", Utc::now());

        assert_eq!(saga.current_state, SagaState::Faulted);
        assert_eq!(saga.fault_reason.as_deref(), Some("no basket reply"));
        assert!(saga.finished_at.is_some());
    }

    #[test]
    fn commands_carry_captured_customer_details() {
        let event = checkout();
        let saga = OrderCheckoutSaga::start(&event, Utc::now());

        let place = saga.place_order();
        assert_eq!(place.basket_id, event.basket_id);
        assert_eq!(place.email, event.email);

        let complete = saga.complete_order();
        assert_eq!(complete.total_money, Money::from_cents(4250));

        let cancel = saga.cancel_order();
        assert_eq!(cancel.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(cancel.order_id, event.order_id);
    }
}
