//! In-memory fakes of the downstream services.
//!
//! Each participant is a [`MessageHandler`](messaging::MessageHandler) with
//! its own inbox namespace and writes its replies through the outbox, the
//! same way the orchestrator does.

pub mod basket;
pub mod notification;
pub mod ordering;

pub use basket::BasketParticipant;
pub use notification::{EmailError, EmailMessage, EmailSender, InMemoryEmailSender, NotificationParticipant};
pub use ordering::{OrderRecord, OrderStatus, OrderingParticipant};

use saga_store::{InboxStore, StoreError, TransitionEffects};
use tracing::debug;

use crate::error::Result;

/// Commits `effects`. Returns false if the inbox entry already existed,
/// meaning another delivery of the same message got there first.
async fn commit_once<St: InboxStore>(store: &St, effects: TransitionEffects) -> Result<bool> {
    match store.record_processed(effects).await {
        Ok(()) => Ok(true),
        Err(StoreError::DuplicateMessage {
            consumer,
            message_id,
        }) => {
            debug!(%consumer, %message_id, "concurrent duplicate delivery");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
