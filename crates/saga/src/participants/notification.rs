//! Notification service fake.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use contracts::{
    IntegrationMessage, MessageEnvelope, OrderStatusChangedToCancel, OrderStatusChangedToComplete,
};
use messaging::{HandlerError, MessageHandler};
use saga_store::{InboxStore, TransitionEffects};
use thiserror::Error;
use tracing::{debug, info};

use super::commit_once;
use crate::error::{Result, SagaError};

/// An outgoing customer email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
#[error("email delivery failed: {0}")]
pub struct EmailError(pub String);

/// Delivers emails.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> std::result::Result<(), EmailError>;
}

#[derive(Debug, Default)]
struct SenderState {
    sent: Vec<EmailMessage>,
    fail_next: u32,
}

/// Email sender that keeps messages in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEmailSender {
    state: Arc<RwLock<SenderState>>,
}

impl InMemoryEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail.
    pub fn set_fail_next(&self, count: u32) {
        if let Ok(mut state) = self.state.write() {
            state.fail_next = count;
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.state
            .read()
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for InMemoryEmailSender {
    async fn send(&self, email: &EmailMessage) -> std::result::Result<(), EmailError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| EmailError("sender lock poisoned".to_string()))?;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(EmailError("smtp relay unavailable".to_string()));
        }
        state.sent.push(email.clone());
        Ok(())
    }
}

/// Emails the customer when an order is finalized.
///
/// Send failures are returned to the consumer for retry and never reach
/// the saga.
pub struct NotificationParticipant<St, E> {
    store: St,
    sender: E,
    consumer_name: String,
}

impl<St: InboxStore, E: EmailSender> NotificationParticipant<St, E> {
    pub fn new(store: St, sender: E) -> Self {
        Self {
            store,
            sender,
            consumer_name: "notification".to_string(),
        }
    }

    async fn notify(&self, envelope: &MessageEnvelope) -> Result<()> {
        if self
            .store
            .has_processed(&self.consumer_name, envelope.message_id)
            .await?
        {
            return Ok(());
        }

        let email = match envelope.message_type.as_str() {
            OrderStatusChangedToComplete::MESSAGE_TYPE => {
                let event: OrderStatusChangedToComplete = envelope.decode()?;
                event.email.map(|to| EmailMessage {
                    to,
                    subject: format!("Your order {} is confirmed", event.order_id),
                    body: format!(
                        "Hi {}, we received your payment of ${}.",
                        event.full_name.as_deref().unwrap_or("there"),
                        event.total_money
                    ),
                })
            }
            OrderStatusChangedToCancel::MESSAGE_TYPE => {
                let event: OrderStatusChangedToCancel = envelope.decode()?;
                event.email.map(|to| EmailMessage {
                    to,
                    subject: format!("Your order {} was cancelled", event.order_id),
                    body: format!(
                        "Hi {}, your order of ${} could not be completed.",
                        event.full_name.as_deref().unwrap_or("there"),
                        event.total_money
                    ),
                })
            }
            other => return Err(SagaError::UnsupportedMessage(other.to_string())),
        };

        match &email {
            Some(email) => {
                self.sender
                    .send(email)
                    .await
                    .map_err(|e| SagaError::Participant(e.to_string()))?;
                info!(order_id = %envelope.correlation_id, to = %email.to, "order email sent");
            }
            None => debug!(order_id = %envelope.correlation_id, "no email address, skipping"),
        }

        commit_once(
            &self.store,
            TransitionEffects::processed(&self.consumer_name, envelope.message_id),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl<St: InboxStore, E: EmailSender> MessageHandler for NotificationParticipant<St, E> {
    fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    fn message_types(&self) -> Vec<&'static str> {
        vec![
            OrderStatusChangedToComplete::MESSAGE_TYPE,
            OrderStatusChangedToCancel::MESSAGE_TYPE,
        ]
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> std::result::Result<(), HandlerError> {
        self.notify(envelope)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}
