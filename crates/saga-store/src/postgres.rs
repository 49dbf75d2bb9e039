use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageId, OrderId};
use contracts::MessageEnvelope;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::debug;
use uuid::Uuid;

use crate::{
    FaultKind, FaultRecord, FaultStore, InboxStore, OutboxRecord, OutboxStatus, OutboxStore,
    Result, SagaData, SagaStore, StoreError, TransitionEffects, Version,
};

/// PostgreSQL-backed saga store.
///
/// Each write runs in one transaction covering the saga row, the inbox
/// entry, the outbox rows and the fault record.
pub struct PostgresSagaStore<S> {
    pool: PgPool,
    _saga: PhantomData<fn() -> S>,
}

impl<S> Clone for PostgresSagaStore<S> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _saga: PhantomData,
        }
    }
}

impl<S: SagaData> PostgresSagaStore<S> {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _saga: PhantomData,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_saga(row: PgRow) -> Result<(S, Version)> {
        let data: serde_json::Value = row.try_get("data")?;
        let version: i64 = row.try_get("version")?;
        Ok((serde_json::from_value(data)?, Version::new(version)))
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxRecord> {
        let envelope: serde_json::Value = row.try_get("envelope")?;
        let status: String = row.try_get("status")?;
        let attempts: i32 = row.try_get("attempts")?;

        Ok(OutboxRecord {
            sequence: row.try_get("sequence")?,
            envelope: serde_json::from_value(envelope)?,
            status: OutboxStatus::parse(&status)?,
            attempts: attempts.max(0) as u32,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            sent_at: row.try_get("sent_at")?,
        })
    }

    fn row_to_fault(row: PgRow) -> Result<FaultRecord> {
        let kind: String = row.try_get("kind")?;
        let attempts: i32 = row.try_get("attempts")?;
        let envelope: Option<serde_json::Value> = row.try_get("envelope")?;

        Ok(FaultRecord {
            id: row.try_get("id")?,
            kind: FaultKind::parse(&kind)?,
            consumer: row.try_get("consumer")?,
            message_id: MessageId::from_uuid(row.try_get::<Uuid, _>("message_id")?),
            correlation_id: OrderId::from_uuid(row.try_get::<Uuid, _>("correlation_id")?),
            message_type: row.try_get("message_type")?,
            reason: row.try_get("reason")?,
            attempts: attempts.max(0) as u32,
            envelope: envelope.map(serde_json::from_value).transpose()?,
            parked_at: row.try_get("parked_at")?,
        })
    }
}

/// Writes the effects inside `tx`. Fails with `DuplicateMessage` if the
/// inbox entry exists; the caller drops the transaction, rolling back.
async fn apply_effects(tx: &mut Transaction<'_, Postgres>, effects: TransitionEffects) -> Result<()> {
    if let Some(entry) = effects.inbox {
        let inserted = sqlx::query(
            r#"
            INSERT INTO inbox_messages (consumer, message_id, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (consumer, message_id) DO NOTHING
            "#,
        )
        .bind(&entry.consumer)
        .bind(entry.message_id.as_uuid())
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::DuplicateMessage {
                consumer: entry.consumer,
                message_id: entry.message_id,
            });
        }
    }

    for envelope in &effects.outbox {
        insert_outbox(tx, envelope).await?;
    }

    if let Some(fault) = &effects.fault {
        insert_fault(&mut **tx, fault).await?;
    }

    Ok(())
}

async fn insert_outbox(tx: &mut Transaction<'_, Postgres>, envelope: &MessageEnvelope) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox_messages (message_id, message_type, correlation_id, envelope, status)
        VALUES ($1, $2, $3, $4, 'pending')
        "#,
    )
    .bind(envelope.message_id.as_uuid())
    .bind(&envelope.message_type)
    .bind(envelope.correlation_id.as_uuid())
    .bind(serde_json::to_value(envelope)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_fault<'e, E>(executor: E, fault: &FaultRecord) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let envelope = fault.envelope.as_ref().map(serde_json::to_value).transpose()?;
    let inserted = sqlx::query(
        r#"
        INSERT INTO saga_faults
            (id, kind, consumer, message_id, correlation_id, message_type, reason, attempts, envelope, parked_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (consumer, message_id) DO NOTHING
        "#,
    )
    .bind(fault.id)
    .bind(fault.kind.as_str())
    .bind(&fault.consumer)
    .bind(fault.message_id.as_uuid())
    .bind(fault.correlation_id.as_uuid())
    .bind(&fault.message_type)
    .bind(&fault.reason)
    .bind(fault.attempts as i32)
    .bind(envelope)
    .bind(fault.parked_at)
    .execute(executor)
    .await?
    .rows_affected();
    Ok(inserted > 0)
}

#[async_trait]
impl<S: SagaData> SagaStore<S> for PostgresSagaStore<S> {
    async fn load(&self, correlation_id: OrderId) -> Result<Option<(S, Version)>> {
        let row = sqlx::query(
            r#"
            SELECT data, version
            FROM checkout_sagas
            WHERE correlation_id = $1 AND saga_type = $2
            "#,
        )
        .bind(correlation_id.as_uuid())
        .bind(S::SAGA_TYPE)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_saga).transpose()
    }

    #[tracing::instrument(skip(self, instance, effects), fields(correlation_id = %instance.correlation_id()))]
    async fn create(&self, instance: &S, effects: TransitionEffects) -> Result<Version> {
        let correlation_id = instance.correlation_id();
        let version = Version::initial();
        let mut tx = self.pool.begin().await?;

        apply_effects(&mut tx, effects).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO checkout_sagas (correlation_id, saga_type, current_state, version, data, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (correlation_id) DO NOTHING
            "#,
        )
        .bind(correlation_id.as_uuid())
        .bind(S::SAGA_TYPE)
        .bind(instance.state_name())
        .bind(version.as_i64())
        .bind(serde_json::to_value(instance)?)
        .bind(instance.updated_at())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::AlreadyExists(correlation_id));
        }

        tx.commit().await?;
        debug!(%correlation_id, "saga created");
        Ok(version)
    }

    #[tracing::instrument(skip(self, instance, effects))]
    async fn commit_transition(
        &self,
        correlation_id: OrderId,
        expected: Version,
        instance: &S,
        effects: TransitionEffects,
    ) -> Result<Version> {
        let next = expected.next();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE checkout_sagas
            SET current_state = $1, data = $2, version = $3, updated_at = $4
            WHERE correlation_id = $5 AND version = $6
            "#,
        )
        .bind(instance.state_name())
        .bind(serde_json::to_value(instance)?)
        .bind(next.as_i64())
        .bind(instance.updated_at())
        .bind(correlation_id.as_uuid())
        .bind(expected.as_i64())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM checkout_sagas WHERE correlation_id = $1")
                    .bind(correlation_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    correlation_id,
                    expected,
                    actual: Version::new(actual),
                },
                None => StoreError::NotFound(correlation_id),
            });
        }

        apply_effects(&mut tx, effects).await?;
        tx.commit().await?;
        Ok(next)
    }

    async fn find_in_state(
        &self,
        state: &str,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(S, Version)>> {
        let rows = sqlx::query(
            r#"
            SELECT data, version
            FROM checkout_sagas
            WHERE saga_type = $1 AND current_state = $2 AND updated_at < $3
            ORDER BY updated_at ASC
            LIMIT $4
            "#,
        )
        .bind(S::SAGA_TYPE)
        .bind(state)
        .bind(updated_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_saga).collect()
    }
}

#[async_trait]
impl<S: SagaData> InboxStore for PostgresSagaStore<S> {
    async fn has_processed(&self, consumer: &str, message_id: MessageId) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM inbox_messages WHERE consumer = $1 AND message_id = $2",
        )
        .bind(consumer)
        .bind(message_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn record_processed(&self, effects: TransitionEffects) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        apply_effects(&mut tx, effects).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl<S: SagaData> OutboxStore for PostgresSagaStore<S> {
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, envelope, status, attempts, last_error, created_at, sent_at
            FROM outbox_messages
            WHERE status = 'pending'
            ORDER BY sequence ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn mark_sent(&self, sequence: i64) -> Result<()> {
        sqlx::query("UPDATE outbox_messages SET status = 'sent', sent_at = NOW() WHERE sequence = $1")
            .bind(sequence)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_attempt_failure(&self, sequence: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE outbox_messages SET attempts = attempts + 1, last_error = $2 WHERE sequence = $1",
        )
        .bind(sequence)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_messages WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl<S: SagaData> FaultStore for PostgresSagaStore<S> {
    async fn park(&self, fault: FaultRecord) -> Result<bool> {
        insert_fault(&self.pool, &fault).await
    }

    async fn faults(&self, limit: usize) -> Result<Vec<FaultRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, consumer, message_id, correlation_id, message_type, reason, attempts, envelope, parked_at
            FROM saga_faults
            ORDER BY parked_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_fault).collect()
    }

    async fn faults_for(&self, correlation_id: OrderId) -> Result<Vec<FaultRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, consumer, message_id, correlation_id, message_type, reason, attempts, envelope, parked_at
            FROM saga_faults
            WHERE correlation_id = $1
            ORDER BY parked_at ASC
            "#,
        )
        .bind(correlation_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_fault).collect()
    }
}
