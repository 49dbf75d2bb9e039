pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;
pub mod version;

pub use error::{Result, StoreError};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use records::{
    FaultKind, FaultRecord, InboxEntry, OutboxRecord, OutboxStatus, TransitionEffects,
};
pub use store::{FaultStore, InboxStore, OutboxStore, ReliableStore, SagaData, SagaStore};
pub use version::Version;
