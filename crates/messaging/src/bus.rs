//! Transport abstraction.

use async_trait::async_trait;
use contracts::MessageEnvelope;
use tokio::sync::mpsc;

use crate::error::Result;

/// A stream of envelopes delivered to one subscriber.
///
/// Delivery is at-least-once: the same envelope may arrive more than once,
/// and envelopes for different orders may interleave arbitrarily.
pub struct Subscription {
    name: String,
    receiver: mpsc::UnboundedReceiver<MessageEnvelope>,
}

impl Subscription {
    /// Wraps a receiver as a named subscription.
    pub fn new(name: impl Into<String>, receiver: mpsc::UnboundedReceiver<MessageEnvelope>) -> Self {
        Self {
            name: name.into(),
            receiver,
        }
    }

    /// Returns the subscriber name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the next delivery. Returns None once the transport closes.
    pub async fn recv(&mut self) -> Option<MessageEnvelope> {
        self.receiver.recv().await
    }

    /// Returns the next delivery if one is already queued.
    pub fn try_recv(&mut self) -> Option<MessageEnvelope> {
        self.receiver.try_recv().ok()
    }
}

/// At-least-once publish/subscribe transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes an envelope.
    ///
    /// Returning `Ok` is the broker acknowledgement: only then may the
    /// caller consider the message sent.
    async fn publish(&self, envelope: &MessageEnvelope) -> Result<()>;

    /// Subscribes `subscriber` to the given message types.
    async fn subscribe(&self, subscriber: &str, message_types: &[&str]) -> Result<Subscription>;
}
