use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageId, OrderId};
use tokio::sync::RwLock;

use crate::{
    FaultRecord, FaultStore, InboxStore, OutboxRecord, OutboxStatus, OutboxStore, Result,
    SagaData, SagaStore, StoreError, TransitionEffects, Version,
};

struct Tables<S> {
    sagas: HashMap<OrderId, (S, Version)>,
    inbox: HashMap<(String, MessageId), DateTime<Utc>>,
    outbox: Vec<OutboxRecord>,
    faults: Vec<FaultRecord>,
}

impl<S> Default for Tables<S> {
    fn default() -> Self {
        Self {
            sagas: HashMap::new(),
            inbox: HashMap::new(),
            outbox: Vec::new(),
            faults: Vec::new(),
        }
    }
}

impl<S> Tables<S> {
    /// Fails before anything is written if the inbox entry exists.
    fn check_inbox(&self, effects: &TransitionEffects) -> Result<()> {
        if let Some(entry) = &effects.inbox
            && self
                .inbox
                .contains_key(&(entry.consumer.clone(), entry.message_id))
        {
            return Err(StoreError::DuplicateMessage {
                consumer: entry.consumer.clone(),
                message_id: entry.message_id,
            });
        }
        Ok(())
    }

    fn apply(&mut self, effects: TransitionEffects) {
        let now = Utc::now();
        if let Some(entry) = effects.inbox {
            self.inbox.insert((entry.consumer, entry.message_id), now);
        }
        for envelope in effects.outbox {
            let sequence = self.outbox.len() as i64 + 1;
            self.outbox.push(OutboxRecord {
                sequence,
                envelope,
                status: OutboxStatus::Pending,
                attempts: 0,
                last_error: None,
                created_at: now,
                sent_at: None,
            });
        }
        if let Some(fault) = effects.fault {
            self.park(fault);
        }
    }

    fn park(&mut self, fault: FaultRecord) -> bool {
        let exists = self
            .faults
            .iter()
            .any(|f| f.consumer == fault.consumer && f.message_id == fault.message_id);
        if !exists {
            self.faults.push(fault);
        }
        !exists
    }

    fn outbox_row(&mut self, sequence: i64) -> Result<&mut OutboxRecord> {
        self.outbox
            .iter_mut()
            .find(|r| r.sequence == sequence)
            .ok_or_else(|| StoreError::Corrupt(format!("no outbox row {sequence}")))
    }
}

/// In-memory saga store for tests and single-process deployments.
///
/// All tables sit behind one lock, so every write is atomic with its
/// effects exactly like a database transaction.
pub struct InMemorySagaStore<S> {
    tables: Arc<RwLock<Tables<S>>>,
}

impl<S> Clone for InMemorySagaStore<S> {
    fn clone(&self) -> Self {
        Self {
            tables: self.tables.clone(),
        }
    }
}

impl<S> Default for InMemorySagaStore<S> {
    fn default() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

impl<S: SagaData> InMemorySagaStore<S> {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sagas.
    pub async fn saga_count(&self) -> usize {
        self.tables.read().await.sagas.len()
    }

    /// Returns every outbox row, sent or not, in sequence order.
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.tables.read().await.outbox.clone()
    }

    /// Returns the number of inbox entries.
    pub async fn inbox_count(&self) -> usize {
        self.tables.read().await.inbox.len()
    }
}

#[async_trait]
impl<S: SagaData> SagaStore<S> for InMemorySagaStore<S> {
    async fn load(&self, correlation_id: OrderId) -> Result<Option<(S, Version)>> {
        Ok(self.tables.read().await.sagas.get(&correlation_id).cloned())
    }

    async fn create(&self, instance: &S, effects: TransitionEffects) -> Result<Version> {
        let correlation_id = instance.correlation_id();
        let mut tables = self.tables.write().await;

        tables.check_inbox(&effects)?;
        if tables.sagas.contains_key(&correlation_id) {
            return Err(StoreError::AlreadyExists(correlation_id));
        }

        let version = Version::initial();
        tables
            .sagas
            .insert(correlation_id, (instance.clone(), version));
        tables.apply(effects);
        Ok(version)
    }

    async fn commit_transition(
        &self,
        correlation_id: OrderId,
        expected: Version,
        instance: &S,
        effects: TransitionEffects,
    ) -> Result<Version> {
        let mut tables = self.tables.write().await;

        let actual = tables
            .sagas
            .get(&correlation_id)
            .map(|(_, v)| *v)
            .ok_or(StoreError::NotFound(correlation_id))?;
        if actual != expected {
            return Err(StoreError::ConcurrencyConflict {
                correlation_id,
                expected,
                actual,
            });
        }
        tables.check_inbox(&effects)?;

        let version = expected.next();
        tables
            .sagas
            .insert(correlation_id, (instance.clone(), version));
        tables.apply(effects);
        Ok(version)
    }

    async fn find_in_state(
        &self,
        state: &str,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(S, Version)>> {
        let tables = self.tables.read().await;
        let mut found: Vec<_> = tables
            .sagas
            .values()
            .filter(|(s, _)| s.state_name() == state && s.updated_at() < updated_before)
            .cloned()
            .collect();
        found.sort_by_key(|(s, _)| s.updated_at());
        found.truncate(limit);
        Ok(found)
    }
}

#[async_trait]
impl<S: SagaData> InboxStore for InMemorySagaStore<S> {
    async fn has_processed(&self, consumer: &str, message_id: MessageId) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .await
            .inbox
            .contains_key(&(consumer.to_string(), message_id)))
    }

    async fn record_processed(&self, effects: TransitionEffects) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_inbox(&effects)?;
        tables.apply(effects);
        Ok(())
    }
}

#[async_trait]
impl<S: SagaData> OutboxStore for InMemorySagaStore<S> {
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .outbox
            .iter()
            .filter(|r| r.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, sequence: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables.outbox_row(sequence)?;
        row.status = OutboxStatus::Sent;
        row.sent_at = Some(Utc::now());
        Ok(())
    }

    async fn record_attempt_failure(&self, sequence: i64, error: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables.outbox_row(sequence)?;
        row.attempts += 1;
        row.last_error = Some(error.to_string());
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .await
            .outbox
            .iter()
            .filter(|r| r.status == OutboxStatus::Pending)
            .count() as u64)
    }
}

#[async_trait]
impl<S: SagaData> FaultStore for InMemorySagaStore<S> {
    async fn park(&self, fault: FaultRecord) -> Result<bool> {
        Ok(self.tables.write().await.park(fault))
    }

    async fn faults(&self, limit: usize) -> Result<Vec<FaultRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.faults.iter().rev().take(limit).cloned().collect())
    }

    async fn faults_for(&self, correlation_id: OrderId) -> Result<Vec<FaultRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .faults
            .iter()
            .filter(|f| f.correlation_id == correlation_id)
            .cloned()
            .collect())
    }
}
