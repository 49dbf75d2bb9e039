//! Closed set of messages exchanged during checkout.

use common::OrderId;

use crate::commands::{CancelOrder, CompleteOrder, PlaceOrder};
use crate::envelope::MessageEnvelope;
use crate::error::{ContractError, Result};
use crate::events::{
    DeleteBasketComplete, DeleteBasketFailed, OrderStatusChangedToCancel,
    OrderStatusChangedToComplete, SagaTimedOut, UserCheckedOut,
};
use crate::message::IntegrationMessage;

/// Any message of the checkout protocol, decoded from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutMessage {
    UserCheckedOut(UserCheckedOut),
    PlaceOrder(PlaceOrder),
    DeleteBasketComplete(DeleteBasketComplete),
    DeleteBasketFailed(DeleteBasketFailed),
    CompleteOrder(CompleteOrder),
    CancelOrder(CancelOrder),
    OrderStatusChangedToComplete(OrderStatusChangedToComplete),
    OrderStatusChangedToCancel(OrderStatusChangedToCancel),
    SagaTimedOut(SagaTimedOut),
}

impl CheckoutMessage {
    /// Every message type of the protocol.
    pub const ALL_TYPES: [&'static str; 9] = [
        UserCheckedOut::MESSAGE_TYPE,
        PlaceOrder::MESSAGE_TYPE,
        DeleteBasketComplete::MESSAGE_TYPE,
        DeleteBasketFailed::MESSAGE_TYPE,
        CompleteOrder::MESSAGE_TYPE,
        CancelOrder::MESSAGE_TYPE,
        OrderStatusChangedToComplete::MESSAGE_TYPE,
        OrderStatusChangedToCancel::MESSAGE_TYPE,
        SagaTimedOut::MESSAGE_TYPE,
    ];

    /// Decodes an envelope into the matching variant.
    pub fn from_envelope(envelope: &MessageEnvelope) -> Result<Self> {
        let message = match envelope.message_type.as_str() {
            UserCheckedOut::MESSAGE_TYPE => Self::UserCheckedOut(envelope.decode()?),
            PlaceOrder::MESSAGE_TYPE => Self::PlaceOrder(envelope.decode()?),
            DeleteBasketComplete::MESSAGE_TYPE => Self::DeleteBasketComplete(envelope.decode()?),
            DeleteBasketFailed::MESSAGE_TYPE => Self::DeleteBasketFailed(envelope.decode()?),
            CompleteOrder::MESSAGE_TYPE => Self::CompleteOrder(envelope.decode()?),
            CancelOrder::MESSAGE_TYPE => Self::CancelOrder(envelope.decode()?),
            OrderStatusChangedToComplete::MESSAGE_TYPE => {
                Self::OrderStatusChangedToComplete(envelope.decode()?)
            }
            OrderStatusChangedToCancel::MESSAGE_TYPE => {
                Self::OrderStatusChangedToCancel(envelope.decode()?)
            }
            SagaTimedOut::MESSAGE_TYPE => Self::SagaTimedOut(envelope.decode()?),
            other => return Err(ContractError::UnknownMessageType(other.to_string())),
        };
        Ok(message)
    }

    /// Returns the wire name of the message.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::UserCheckedOut(_) => UserCheckedOut::MESSAGE_TYPE,
            Self::PlaceOrder(_) => PlaceOrder::MESSAGE_TYPE,
            Self::DeleteBasketComplete(_) => DeleteBasketComplete::MESSAGE_TYPE,
            Self::DeleteBasketFailed(_) => DeleteBasketFailed::MESSAGE_TYPE,
            Self::CompleteOrder(_) => CompleteOrder::MESSAGE_TYPE,
            Self::CancelOrder(_) => CancelOrder::MESSAGE_TYPE,
            Self::OrderStatusChangedToComplete(_) => OrderStatusChangedToComplete::MESSAGE_TYPE,
            Self::OrderStatusChangedToCancel(_) => OrderStatusChangedToCancel::MESSAGE_TYPE,
            Self::SagaTimedOut(_) => SagaTimedOut::MESSAGE_TYPE,
        }
    }

    /// Returns the OrderId correlation key.
    pub fn correlation_id(&self) -> OrderId {
        match self {
            Self::UserCheckedOut(m) => m.correlation_id(),
            Self::PlaceOrder(m) => m.correlation_id(),
            Self::DeleteBasketComplete(m) => m.correlation_id(),
            Self::DeleteBasketFailed(m) => m.correlation_id(),
            Self::CompleteOrder(m) => m.correlation_id(),
            Self::CancelOrder(m) => m.correlation_id(),
            Self::OrderStatusChangedToComplete(m) => m.correlation_id(),
            Self::OrderStatusChangedToCancel(m) => m.correlation_id(),
            Self::SagaTimedOut(m) => m.correlation_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BasketId, Money};

    #[test]
    fn decodes_each_variant_by_type_name() {
        let order_id = OrderId::new();
        let envelope = MessageEnvelope::wrap(&DeleteBasketFailed {
            basket_id: BasketId::new(),
            email: Some("e@x.com".into()),
            order_id,
            total_money: Money::from_cents(4250),
        })
        .unwrap();

        let message = CheckoutMessage::from_envelope(&envelope).unwrap();
        assert_eq!(message.message_type(), "DeleteBasketFailed");
        assert_eq!(message.correlation_id(), order_id);
        assert!(matches!(message, CheckoutMessage::DeleteBasketFailed(_)));
    }

    #[test]
    fn unknown_type_is_reported() {
        let envelope = MessageEnvelope::builder()
            .message_type("BookPriceChanged")
            .correlation_id(OrderId::new())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap();

        let result = CheckoutMessage::from_envelope(&envelope);
        assert!(matches!(result, Err(ContractError::UnknownMessageType(t)) if t == "BookPriceChanged"));
    }

    #[test]
    fn malformed_payload_is_reported() {
        let envelope = MessageEnvelope::builder()
            .message_type("CompleteOrder")
            .correlation_id(OrderId::new())
            .payload_raw(serde_json::json!({"order_id": "nope"}))
            .build()
            .unwrap();

        let result = CheckoutMessage::from_envelope(&envelope);
        assert!(matches!(result, Err(ContractError::Payload(_))));
    }

    #[test]
    fn all_types_are_distinct() {
        let mut types = CheckoutMessage::ALL_TYPES.to_vec();
        types.sort_unstable();
        types.dedup();
        assert_eq!(types.len(), CheckoutMessage::ALL_TYPES.len());
    }
}
