//! Integration message contracts exchanged by the checkout participants.
//!
//! Every message travels inside a [`MessageEnvelope`] carrying a unique
//! message id (the inbox dedup key) and the OrderId correlation key.
//! Payload types are immutable once published; incompatible changes get a
//! new `SCHEMA_VERSION`.

pub mod checkout;
pub mod commands;
pub mod envelope;
pub mod error;
pub mod events;
pub mod message;

pub use checkout::CheckoutMessage;
pub use commands::{CancelOrder, CompleteOrder, PlaceOrder};
pub use common::{BasketId, MessageId, Money, OrderId};
pub use envelope::{MessageEnvelope, MessageEnvelopeBuilder};
pub use error::{ContractError, Result};
pub use events::{
    DeleteBasketComplete, DeleteBasketFailed, OrderStatusChangedToCancel,
    OrderStatusChangedToComplete, SagaTimedOut, UserCheckedOut,
};
pub use message::IntegrationMessage;
