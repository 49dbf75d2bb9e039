//! The trait every integration message implements.

use common::{BasketId, OrderId};
use serde::{Serialize, de::DeserializeOwned};

/// A typed, versioned integration message.
///
/// Messages are facts (events) or requests (commands) crossing a service
/// boundary. They are immutable: once published, a payload is never
/// modified, only superseded by a new schema version.
pub trait IntegrationMessage: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Wire name of the message, used for routing and decoding.
    const MESSAGE_TYPE: &'static str;

    /// Schema version written into every envelope carrying this message.
    const SCHEMA_VERSION: u32 = 1;

    /// The OrderId routing this message to its saga instance.
    fn correlation_id(&self) -> OrderId;

    /// Basket-facing messages also carry the basket key, since the basket
    /// service has no OrderId-keyed storage.
    fn basket_id(&self) -> Option<BasketId> {
        None
    }
}
