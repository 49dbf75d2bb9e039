use chrono::{DateTime, Utc};
use common::{BasketId, MessageId, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, Result};
use crate::message::IntegrationMessage;

/// An envelope carrying one integration message plus its routing metadata.
///
/// The envelope is what the bus transports and what the outbox persists.
/// Its `message_id` is the dedup key checked by every consumer's inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Globally unique id of this message.
    pub message_id: MessageId,

    /// The contract name (e.g., "UserCheckedOut", "PlaceOrder").
    pub message_type: String,

    /// Schema version of the payload.
    pub schema_version: u32,

    /// The OrderId this message belongs to.
    pub correlation_id: OrderId,

    /// Basket key, present on Basket-facing messages.
    pub basket_id: Option<BasketId>,

    /// Id of the message whose handling produced this one.
    pub causation_id: Option<MessageId>,

    /// When the message was created.
    pub timestamp: DateTime<Utc>,

    /// The message payload as JSON.
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    /// Creates a new envelope builder.
    pub fn builder() -> MessageEnvelopeBuilder {
        MessageEnvelopeBuilder::default()
    }

    /// Wraps a typed message in a fresh envelope.
    pub fn wrap<M: IntegrationMessage>(message: &M) -> Result<Self> {
        Self::builder().message(message)?.build()
    }

    /// Wraps a typed message produced while handling `cause`.
    pub fn wrap_caused_by<M: IntegrationMessage>(message: &M, cause: MessageId) -> Result<Self> {
        Self::builder().message(message)?.causation_id(cause).build()
    }

    /// Decodes the payload as `M`, checking the type name, the schema version
    /// and that the payload names the same order as `correlation_id`.
    pub fn decode<M: IntegrationMessage>(&self) -> Result<M> {
        if self.message_type != M::MESSAGE_TYPE {
            return Err(ContractError::TypeMismatch {
                expected: M::MESSAGE_TYPE,
                found: self.message_type.clone(),
            });
        }
        if self.schema_version > M::SCHEMA_VERSION {
            return Err(ContractError::UnsupportedVersion {
                message_type: self.message_type.clone(),
                found: self.schema_version,
                supported: M::SCHEMA_VERSION,
            });
        }
        let message: M = serde_json::from_value(self.payload.clone())?;
        if message.correlation_id() != self.correlation_id {
            return Err(ContractError::CorrelationMismatch {
                envelope: self.correlation_id,
                payload: message.correlation_id(),
            });
        }
        Ok(message)
    }
}

/// Builder for constructing message envelopes.
#[derive(Debug, Default)]
pub struct MessageEnvelopeBuilder {
    message_id: Option<MessageId>,
    message_type: Option<String>,
    schema_version: Option<u32>,
    correlation_id: Option<OrderId>,
    basket_id: Option<BasketId>,
    causation_id: Option<MessageId>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
}

impl MessageEnvelopeBuilder {
    /// Sets the message ID. If not set, a new ID will be generated.
    pub fn message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    /// Sets the message type.
    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    /// Sets the schema version. Defaults to 1.
    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = Some(version);
        self
    }

    /// Sets the correlation id.
    pub fn correlation_id(mut self, id: OrderId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Sets the basket key.
    pub fn basket_id(mut self, id: BasketId) -> Self {
        self.basket_id = Some(id);
        self
    }

    /// Sets the causation id.
    pub fn causation_id(mut self, id: MessageId) -> Self {
        self.causation_id = Some(id);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Fills type, version, routing keys and payload from a typed message.
    pub fn message<M: IntegrationMessage>(mut self, message: &M) -> Result<Self> {
        self.message_type = Some(M::MESSAGE_TYPE.to_string());
        self.schema_version = Some(M::SCHEMA_VERSION);
        self.correlation_id = Some(message.correlation_id());
        self.basket_id = message.basket_id();
        self.payload = Some(serde_json::to_value(message)?);
        Ok(self)
    }

    /// Builds the envelope, failing if a required field is missing.
    pub fn build(self) -> Result<MessageEnvelope> {
        Ok(MessageEnvelope {
            message_id: self.message_id.unwrap_or_default(),
            message_type: self
                .message_type
                .ok_or(ContractError::MissingField("message_type"))?,
            schema_version: self.schema_version.unwrap_or(1),
            correlation_id: self
                .correlation_id
                .ok_or(ContractError::MissingField("correlation_id"))?,
            basket_id: self.basket_id,
            causation_id: self.causation_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: self.payload.ok_or(ContractError::MissingField("payload"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::PlaceOrder;
    use crate::events::{DeleteBasketComplete, UserCheckedOut};
    use common::Money;

    fn checkout() -> UserCheckedOut {
        UserCheckedOut {
            order_id: OrderId::new(),
            basket_id: BasketId::new(),
            full_name: Some("Ada Lovelace".to_string()),
            email: Some("e@x.com".to_string()),
            total_money: Money::from_cents(4250),
        }
    }

    #[test]
    fn wrap_copies_routing_keys() {
        let event = checkout();
        let envelope = MessageEnvelope::wrap(&event).unwrap();

        assert_eq!(envelope.message_type, "UserCheckedOut");
        assert_eq!(envelope.schema_version, 1);
        assert_eq!(envelope.correlation_id, event.order_id);
        assert_eq!(envelope.basket_id, Some(event.basket_id));
        assert!(envelope.causation_id.is_none());
    }

    #[test]
    fn wrapped_messages_get_distinct_ids() {
        let event = checkout();
        let a = MessageEnvelope::wrap(&event).unwrap();
        let b = MessageEnvelope::wrap(&event).unwrap();
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn decode_returns_typed_payload() {
        let event = checkout();
        let envelope = MessageEnvelope::wrap(&event).unwrap();
        let decoded: UserCheckedOut = envelope.decode().unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn decode_rejects_wrong_type() {
        let envelope = MessageEnvelope::wrap(&checkout()).unwrap();
        let result = envelope.decode::<DeleteBasketComplete>();
        assert!(matches!(result, Err(ContractError::TypeMismatch { .. })));
    }

    #[test]
    fn decode_rejects_newer_schema() {
        let mut envelope = MessageEnvelope::wrap(&checkout()).unwrap();
        envelope.schema_version = 2;
        let result = envelope.decode::<UserCheckedOut>();
        assert!(matches!(
            result,
            Err(ContractError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn decode_rejects_payload_for_another_order() {
        let event = checkout();
        let mut envelope = MessageEnvelope::wrap(&event).unwrap();
        let routed_to = OrderId::new();
        envelope.correlation_id = routed_to;

        let result = envelope.decode::<UserCheckedOut>();
        assert!(matches!(
            result,
            Err(ContractError::CorrelationMismatch { envelope, payload })
                if envelope == routed_to && payload == event.order_id
        ));
    }

    #[test]
    fn causation_is_recorded() {
        let cause = MessageId::new();
        let command = PlaceOrder {
            basket_id: BasketId::new(),
            email: None,
            order_id: OrderId::new(),
            total_money: Money::from_cents(100),
        };
        let envelope = MessageEnvelope::wrap_caused_by(&command, cause).unwrap();
        assert_eq!(envelope.causation_id, Some(cause));
    }

    #[test]
    fn builder_reports_missing_fields() {
        let result = MessageEnvelope::builder().message_type("X").build();
        assert!(matches!(
            result,
            Err(ContractError::MissingField("correlation_id"))
        ));
    }
}
