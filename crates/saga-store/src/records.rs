use chrono::{DateTime, Utc};
use common::{MessageId, OrderId};
use contracts::MessageEnvelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Marks `(consumer, message_id)` as processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InboxEntry {
    pub consumer: String,
    pub message_id: MessageId,
}

impl InboxEntry {
    pub fn new(consumer: impl Into<String>, message_id: MessageId) -> Self {
        Self {
            consumer: consumer.into(),
            message_id,
        }
    }
}

/// Dispatch status of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            other => Err(StoreError::Corrupt(format!("unknown outbox status '{other}'"))),
        }
    }
}

/// An outgoing message persisted with the state change that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboxRecord {
    /// Monotonic insertion order. Dispatch follows it.
    pub sequence: i64,
    pub envelope: MessageEnvelope,
    pub status: OutboxStatus,
    /// Failed publish attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Why a message was parked instead of processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// No saga exists for a non-start message.
    Orphaned,
    /// The (state, trigger) pair has no edge and is not a known duplicate.
    UnknownTransition,
    /// Delivery failed on every attempt.
    PoisonMessage,
    /// The saga overran its deadline.
    TimedOut,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orphaned => "orphaned",
            Self::UnknownTransition => "unknown_transition",
            Self::PoisonMessage => "poison_message",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "orphaned" => Ok(Self::Orphaned),
            "unknown_transition" => Ok(Self::UnknownTransition),
            "poison_message" => Ok(Self::PoisonMessage),
            "timed_out" => Ok(Self::TimedOut),
            other => Err(StoreError::Corrupt(format!("unknown fault kind '{other}'"))),
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parked or dead-lettered message kept for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultRecord {
    pub id: Uuid,
    pub kind: FaultKind,
    pub consumer: String,
    pub message_id: MessageId,
    pub correlation_id: OrderId,
    pub message_type: String,
    pub reason: String,
    pub attempts: u32,
    pub envelope: Option<MessageEnvelope>,
    pub parked_at: DateTime<Utc>,
}

impl FaultRecord {
    /// Builds a fault for `envelope` as seen by `consumer`.
    pub fn new(
        kind: FaultKind,
        consumer: impl Into<String>,
        envelope: &MessageEnvelope,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            consumer: consumer.into(),
            message_id: envelope.message_id,
            correlation_id: envelope.correlation_id,
            message_type: envelope.message_type.clone(),
            reason: reason.into(),
            attempts: 1,
            envelope: Some(envelope.clone()),
            parked_at: Utc::now(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn parked_at(mut self, at: DateTime<Utc>) -> Self {
        self.parked_at = at;
        self
    }
}

/// Side effects committed in the same atomic unit as a saga write.
#[derive(Debug, Clone, Default)]
pub struct TransitionEffects {
    pub inbox: Option<InboxEntry>,
    pub outbox: Vec<MessageEnvelope>,
    pub fault: Option<FaultRecord>,
}

impl TransitionEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effects that record `message_id` as processed by `consumer`.
    pub fn processed(consumer: impl Into<String>, message_id: MessageId) -> Self {
        Self {
            inbox: Some(InboxEntry::new(consumer, message_id)),
            ..Self::default()
        }
    }

    pub fn with_outbox(mut self, envelope: MessageEnvelope) -> Self {
        self.outbox.push(envelope);
        self
    }

    pub fn with_fault(mut self, fault: FaultRecord) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.inbox.is_none() && self.outbox.is_empty() && self.fault.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> MessageEnvelope {
        MessageEnvelope::builder()
            .message_type("DeleteBasketComplete")
            .correlation_id(OrderId::new())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn status_and_kind_names_parse_back() {
        for status in [OutboxStatus::Pending, OutboxStatus::Sent] {
            assert_eq!(OutboxStatus::parse(status.as_str()).unwrap(), status);
        }
        for kind in [
            FaultKind::Orphaned,
            FaultKind::UnknownTransition,
            FaultKind::PoisonMessage,
            FaultKind::TimedOut,
        ] {
            assert_eq!(FaultKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(matches!(
            FaultKind::parse("lost"),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn fault_copies_envelope_routing() {
        let e = envelope();
        let fault = FaultRecord::new(FaultKind::Orphaned, "orchestrator", &e, "no saga")
            .with_attempts(3);

        assert_eq!(fault.message_id, e.message_id);
        assert_eq!(fault.correlation_id, e.correlation_id);
        assert_eq!(fault.message_type, "DeleteBasketComplete");
        assert_eq!(fault.attempts, 3);
        assert_eq!(fault.envelope.as_ref(), Some(&e));
    }

    #[test]
    fn effects_builder() {
        let e = envelope();
        let effects = TransitionEffects::processed("c", e.message_id).with_outbox(e.clone());
        assert_eq!(effects.inbox, Some(InboxEntry::new("c", e.message_id)));
        assert_eq!(effects.outbox.len(), 1);
        assert!(!effects.is_empty());
        assert!(TransitionEffects::new().is_empty());
    }
}
