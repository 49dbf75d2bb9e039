//! Order checkout saga.
//!
//! The orchestrator coordinates three services that only talk through
//! messages:
//! 1. Ordering publishes `UserCheckedOut`; the saga starts and sends `PlaceOrder`
//! 2. Basket clears the cart and replies `DeleteBasketComplete` or `DeleteBasketFailed`
//! 3. The saga sends `CompleteOrder`, or compensates with `CancelOrder`
//!
//! State changes, inbox entries and outgoing commands commit together;
//! the [`OutboxDispatcher`] publishes the commands afterwards.

pub mod clock;
pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod graph;
pub mod instance;
pub mod orchestrator;
pub mod participants;
pub mod state;
pub mod timeout;
pub mod transitions;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SagaConfig, TimeoutAction};
pub use consumer::StoreDeadLetters;
pub use dispatcher::{DispatchReport, DispatcherConfig, OutboxDispatcher};
pub use error::{Result, SagaError};
pub use instance::OrderCheckoutSaga;
pub use orchestrator::{HandleOutcome, OrderCheckoutOrchestrator};
pub use participants::{
    BasketParticipant, EmailMessage, EmailSender, InMemoryEmailSender, NotificationParticipant,
    OrderStatus, OrderingParticipant,
};
pub use state::SagaState;
pub use timeout::SagaTimeoutMonitor;
