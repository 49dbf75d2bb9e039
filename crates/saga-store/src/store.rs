use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageId, OrderId};
use serde::{Serialize, de::DeserializeOwned};

use crate::{FaultRecord, OutboxRecord, Result, TransitionEffects, Version};

/// Persistent state of one saga type.
pub trait SagaData: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name stored next to each row (e.g., "OrderCheckout").
    const SAGA_TYPE: &'static str;

    /// The instance key. Never changes.
    fn correlation_id(&self) -> OrderId;

    /// Name of the current state, indexed for lookups.
    fn state_name(&self) -> &'static str;

    /// When the instance was last mutated.
    fn updated_at(&self) -> DateTime<Utc>;
}

/// Versioned storage of saga instances.
///
/// Every write commits the instance together with its [`TransitionEffects`]
/// in one atomic unit: either the row, the inbox entry, the outbox rows and
/// the fault record all become visible, or none of them do.
#[async_trait]
pub trait SagaStore<S: SagaData>: Send + Sync {
    /// Loads an instance and its current version.
    async fn load(&self, correlation_id: OrderId) -> Result<Option<(S, Version)>>;

    /// Inserts a new instance at [`Version::initial`].
    ///
    /// Fails with `AlreadyExists` if an instance with the same correlation
    /// id exists, and with `DuplicateMessage` if the inbox entry is present.
    async fn create(&self, instance: &S, effects: TransitionEffects) -> Result<Version>;

    /// Replaces the instance if it is still at `expected`.
    ///
    /// Returns the new version, `ConcurrencyConflict` if another writer got
    /// there first, or `NotFound`.
    async fn commit_transition(
        &self,
        correlation_id: OrderId,
        expected: Version,
        instance: &S,
        effects: TransitionEffects,
    ) -> Result<Version>;

    /// Finds instances in `state` last updated before `updated_before`,
    /// oldest first.
    async fn find_in_state(
        &self,
        state: &str,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(S, Version)>>;
}

/// Dedup record of processed inbound messages.
#[async_trait]
pub trait InboxStore: Send + Sync {
    async fn has_processed(&self, consumer: &str, message_id: MessageId) -> Result<bool>;

    /// Commits effects that do not touch a saga row.
    ///
    /// Fails with `DuplicateMessage` if the inbox entry already exists, in
    /// which case nothing is written.
    async fn record_processed(&self, effects: TransitionEffects) -> Result<()>;
}

/// Pending outgoing messages.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `limit` pending rows in sequence order.
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>>;

    async fn mark_sent(&self, sequence: i64) -> Result<()>;

    async fn record_attempt_failure(&self, sequence: i64, error: &str) -> Result<()>;

    async fn pending_count(&self) -> Result<u64>;
}

/// Parked and dead-lettered messages.
#[async_trait]
pub trait FaultStore: Send + Sync {
    /// Parks a message. Returns false if `(consumer, message_id)` was
    /// already parked.
    async fn park(&self, fault: FaultRecord) -> Result<bool>;

    /// Most recent faults first.
    async fn faults(&self, limit: usize) -> Result<Vec<FaultRecord>>;

    async fn faults_for(&self, correlation_id: OrderId) -> Result<Vec<FaultRecord>>;
}

/// Everything a saga host needs from one backing store.
pub trait ReliableStore<S: SagaData>: SagaStore<S> + InboxStore + OutboxStore + FaultStore {}

impl<S, T> ReliableStore<S> for T
where
    S: SagaData,
    T: SagaStore<S> + InboxStore + OutboxStore + FaultStore,
{
}
