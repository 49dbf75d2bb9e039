//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p saga-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::OrderId;
use contracts::MessageEnvelope;
use saga_store::{
    FaultKind, FaultRecord, FaultStore, InboxStore, OutboxStatus, OutboxStore, PostgresSagaStore,
    SagaData, SagaStore, StoreError, TransitionEffects, Version,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_checkout_saga_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ticket {
    id: OrderId,
    open: bool,
    touched: DateTime<Utc>,
}

impl SagaData for Ticket {
    const SAGA_TYPE: &'static str = "Ticket";

    fn correlation_id(&self) -> OrderId {
        self.id
    }

    fn state_name(&self) -> &'static str {
        if self.open { "Open" } else { "Closed" }
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.touched
    }
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresSagaStore<Ticket> {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE checkout_sagas, inbox_messages, outbox_messages, saga_faults")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaStore::new(pool)
}

fn ticket() -> Ticket {
    Ticket {
        id: OrderId::new(),
        open: true,
        touched: Utc::now(),
    }
}

fn envelope(id: OrderId, message_type: &str) -> MessageEnvelope {
    MessageEnvelope::builder()
        .message_type(message_type)
        .correlation_id(id)
        .payload_raw(serde_json::json!({"test": true}))
        .build()
        .unwrap()
}

#[tokio::test]
async fn create_and_load_saga() {
    let store = get_test_store().await;
    let t = ticket();

    let version = store.create(&t, TransitionEffects::new()).await.unwrap();
    assert_eq!(version, Version::initial());

    let (loaded, v) = store.load(t.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, t.id);
    assert!(loaded.open);
    assert_eq!(v, Version::initial());
}

#[tokio::test]
async fn load_missing_saga_returns_none() {
    let store = get_test_store().await;
    assert!(store.load(OrderId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_create_reports_already_exists() {
    let store = get_test_store().await;
    let t = ticket();
    store.create(&t, TransitionEffects::new()).await.unwrap();

    let result = store.create(&t, TransitionEffects::new()).await;
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
}

#[tokio::test]
async fn commit_with_stale_version_conflicts() {
    let store = get_test_store().await;
    let mut t = ticket();
    store.create(&t, TransitionEffects::new()).await.unwrap();

    t.open = false;
    let v1 = store
        .commit_transition(t.id, Version::initial(), &t, TransitionEffects::new())
        .await
        .unwrap();
    assert_eq!(v1, Version::new(1));

    let result = store
        .commit_transition(t.id, Version::initial(), &t, TransitionEffects::new())
        .await;
    match result {
        Err(StoreError::ConcurrencyConflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, Version::initial());
            assert_eq!(actual, Version::new(1));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn commit_on_missing_saga_is_not_found() {
    let store = get_test_store().await;
    let t = ticket();
    let result = store
        .commit_transition(t.id, Version::initial(), &t, TransitionEffects::new())
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn concurrent_commits_have_one_winner() {
    let store = get_test_store().await;
    let mut t = ticket();
    store.create(&t, TransitionEffects::new()).await.unwrap();
    t.open = false;

    let a = store.clone();
    let b = store.clone();
    let (ta, tb) = (t.clone(), t.clone());
    let (ra, rb) = tokio::join!(
        a.commit_transition(ta.id, Version::initial(), &ta, TransitionEffects::new()),
        b.commit_transition(tb.id, Version::initial(), &tb, TransitionEffects::new()),
    );

    let wins = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(
        [ra, rb]
            .into_iter()
            .any(|r| matches!(r, Err(StoreError::ConcurrencyConflict { .. })))
    );
}

#[tokio::test]
async fn transition_effects_commit_atomically() {
    let store = get_test_store().await;
    let t = ticket();
    let incoming = envelope(t.id, "Start");
    let outgoing = envelope(t.id, "Next");

    store
        .create(
            &t,
            TransitionEffects::processed("orchestrator", incoming.message_id)
                .with_outbox(outgoing.clone()),
        )
        .await
        .unwrap();

    assert!(
        store
            .has_processed("orchestrator", incoming.message_id)
            .await
            .unwrap()
    );
    let pending = store.pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].envelope, outgoing);
    assert_eq!(pending[0].status, OutboxStatus::Pending);
}

#[tokio::test]
async fn duplicate_inbox_entry_rolls_back_the_transition() {
    let store = get_test_store().await;
    let mut t = ticket();
    let incoming = envelope(t.id, "Start");
    store
        .create(&t, TransitionEffects::processed("c", incoming.message_id))
        .await
        .unwrap();

    t.open = false;
    let result = store
        .commit_transition(
            t.id,
            Version::initial(),
            &t,
            TransitionEffects::processed("c", incoming.message_id)
                .with_outbox(envelope(t.id, "Next")),
        )
        .await;

    assert!(matches!(result, Err(StoreError::DuplicateMessage { .. })));
    let (loaded, version) = store.load(t.id).await.unwrap().unwrap();
    assert!(loaded.open);
    assert_eq!(version, Version::initial());
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn outbox_dispatch_bookkeeping() {
    let store = get_test_store().await;
    let id = OrderId::new();
    store
        .record_processed(
            TransitionEffects::new()
                .with_outbox(envelope(id, "A"))
                .with_outbox(envelope(id, "B")),
        )
        .await
        .unwrap();

    let pending = store.pending(10).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending[0].sequence < pending[1].sequence);
    assert_eq!(pending[0].envelope.message_type, "A");

    store
        .record_attempt_failure(pending[0].sequence, "broker down")
        .await
        .unwrap();
    store.mark_sent(pending[0].sequence).await.unwrap();

    let remaining = store.pending(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].envelope.message_type, "B");
    assert_eq!(store.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn faults_are_parked_once() {
    let store = get_test_store().await;
    let e = envelope(OrderId::new(), "DeleteBasketComplete");

    let first = store
        .park(FaultRecord::new(FaultKind::Orphaned, "c", &e, "no saga"))
        .await
        .unwrap();
    let second = store
        .park(FaultRecord::new(FaultKind::Orphaned, "c", &e, "no saga"))
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
    let faults = store.faults_for(e.correlation_id).await.unwrap();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, FaultKind::Orphaned);
    assert_eq!(faults[0].envelope.as_ref(), Some(&e));
    assert_eq!(store.faults(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn find_in_state_returns_stale_sagas() {
    let store = get_test_store().await;
    let mut stale = ticket();
    stale.touched = Utc::now() - Duration::minutes(30);
    let fresh = ticket();
    store.create(&stale, TransitionEffects::new()).await.unwrap();
    store.create(&fresh, TransitionEffects::new()).await.unwrap();

    let found = store
        .find_in_state("Open", Utc::now() - Duration::minutes(5), 10)
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0.id, stale.id);
}
