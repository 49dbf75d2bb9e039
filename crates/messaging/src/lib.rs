//! Message transport for the checkout saga.
//!
//! Provides:
//! - [`MessageBus`]: at-least-once publish/subscribe transport
//! - [`InMemoryMessageBus`]: single-process implementation for tests and demos
//! - [`Consumer`]: a worker that feeds deliveries to a [`MessageHandler`] in
//!   parallel, retrying with back-off and dead-lettering poison messages
//! - [`RetryPolicy`]: bounded exponential back-off

pub mod bus;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod retry;

pub use bus::{MessageBus, Subscription};
pub use consumer::{
    Consumer, ConsumerConfig, DeadLetterSink, DeliveryOutcome, HandlerError, MessageHandler,
};
pub use error::{Result, TransportError};
pub use memory::InMemoryMessageBus;
pub use retry::RetryPolicy;
