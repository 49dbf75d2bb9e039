use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use contracts::MessageEnvelope;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::bus::{MessageBus, Subscription};
use crate::error::{Result, TransportError};

struct Subscriber {
    name: String,
    message_types: HashSet<String>,
    sender: mpsc::UnboundedSender<MessageEnvelope>,
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<Subscriber>,
    /// `None` unless the bus was built with [`InMemoryMessageBus::recording`].
    published: Option<Vec<MessageEnvelope>>,
    unavailable_for: u32,
}

/// In-memory message bus for tests and single-process deployments.
///
/// Every subscriber whose type filter matches receives its own copy of a
/// published envelope. Publishing the same envelope twice delivers it twice,
/// which is how tests simulate broker redelivery.
///
/// A bus from [`new`](Self::new) keeps nothing once delivered; tests that
/// inspect traffic use [`recording`](Self::recording).
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    state: Arc<RwLock<BusState>>,
}

impl InMemoryMessageBus {
    /// Creates a new bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that also keeps every acknowledged envelope for
    /// [`published`](Self::published).
    pub fn recording() -> Self {
        Self {
            state: Arc::new(RwLock::new(BusState {
                published: Some(Vec::new()),
                ..BusState::default()
            })),
        }
    }

    /// Makes the next `count` publish calls fail with `Unavailable`.
    pub async fn set_unavailable_for(&self, count: u32) {
        self.state.write().await.unavailable_for = count;
    }

    /// Returns every envelope acknowledged so far, in publish order.
    ///
    /// Always empty for a bus that is not recording.
    pub async fn published(&self) -> Vec<MessageEnvelope> {
        self.state.read().await.published.clone().unwrap_or_default()
    }

    /// Returns acknowledged envelopes of one message type.
    pub async fn published_of_type(&self, message_type: &str) -> Vec<MessageEnvelope> {
        self.state
            .read()
            .await
            .published
            .iter()
            .flatten()
            .filter(|e| e.message_type == message_type)
            .cloned()
            .collect()
    }

    /// Returns the number of live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.state
            .read()
            .await
            .subscribers
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, envelope: &MessageEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if state.unavailable_for > 0 {
            state.unavailable_for -= 1;
            return Err(TransportError::Unavailable(
                "in-memory broker marked unavailable".to_string(),
            ));
        }

        state.subscribers.retain(|s| !s.sender.is_closed());
        let mut delivered = 0;
        for subscriber in &state.subscribers {
            if subscriber.message_types.contains(&envelope.message_type)
                && subscriber.sender.send(envelope.clone()).is_ok()
            {
                delivered += 1;
            }
        }
        if let Some(published) = state.published.as_mut() {
            published.push(envelope.clone());
        }

        debug!(
            message_id = %envelope.message_id,
            message_type = %envelope.message_type,
            delivered,
            "message published"
        );
        Ok(())
    }

    async fn subscribe(&self, subscriber: &str, message_types: &[&str]) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state.write().await.subscribers.push(Subscriber {
            name: subscriber.to_string(),
            message_types: message_types.iter().map(|t| t.to_string()).collect(),
            sender,
        });
        Ok(Subscription::new(subscriber, receiver))
    }
}

impl std::fmt::Debug for InMemoryMessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMessageBus").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("name", &self.name)
            .field("message_types", &self.message_types)
            .finish()
    }
}
