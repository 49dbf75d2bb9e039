//! Order checkout orchestrator.

use std::time::Instant;

use common::OrderId;
use contracts::{CheckoutMessage, MessageEnvelope};
use saga_store::{
    FaultKind, FaultRecord, InboxStore, SagaStore, StoreError, TransitionEffects, Version,
};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::instance::OrderCheckoutSaga;
use crate::state::SagaState;
use crate::transitions::{self, Command, Decision, Trigger};

/// What handling one envelope did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The saga moved along an edge.
    Applied {
        from: SagaState,
        to: SagaState,
        version: Version,
        emitted: Option<&'static str>,
    },
    /// This consumer already processed the message id.
    InboxHit,
    /// A duplicate or late message, recorded without effect.
    Duplicate { state: SagaState },
    /// The message was parked in the fault store.
    Parked { kind: FaultKind },
}

/// Drives order checkout sagas from incoming messages.
///
/// Each envelope produces at most one transition. The saga row, the inbox
/// entry and any outgoing commands are committed in one store write; the
/// commands are published later by the
/// [`OutboxDispatcher`](crate::OutboxDispatcher).
pub struct OrderCheckoutOrchestrator<St, C = SystemClock> {
    store: St,
    clock: C,
    config: SagaConfig,
}

impl<St> OrderCheckoutOrchestrator<St, SystemClock>
where
    St: SagaStore<OrderCheckoutSaga> + InboxStore,
{
    /// Creates an orchestrator using the system clock.
    pub fn new(store: St, config: SagaConfig) -> Self {
        Self::with_clock(store, SystemClock, config)
    }
}

impl<St, C> OrderCheckoutOrchestrator<St, C>
where
    St: SagaStore<OrderCheckoutSaga> + InboxStore,
    C: Clock,
{
    pub fn with_clock(store: St, clock: C, config: SagaConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    pub fn consumer_name(&self) -> &str {
        &self.config.consumer_name
    }

    /// Loads the current state of one saga.
    pub async fn saga(&self, correlation_id: OrderId) -> Result<Option<(OrderCheckoutSaga, Version)>> {
        Ok(self.store.load(correlation_id).await?)
    }

    /// Handles one delivery.
    ///
    /// Returns an error for messages the saga does not consume, for payloads
    /// that fail to decode, and when conflicts persist past
    /// `max_conflict_retries`. The caller retries those deliveries.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            message_id = %envelope.message_id,
            message_type = %envelope.message_type,
            correlation_id = %envelope.correlation_id,
        )
    )]
    pub async fn handle(&self, envelope: &MessageEnvelope) -> Result<HandleOutcome> {
        transitions::validate()?;
        metrics::counter!("saga_messages_total", "message_type" => envelope.message_type.clone())
            .increment(1);
        let started = Instant::now();

        let outcome = self.handle_inner(envelope).await;

        metrics::histogram!("saga_handle_duration_seconds").record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn handle_inner(&self, envelope: &MessageEnvelope) -> Result<HandleOutcome> {
        if self
            .store
            .has_processed(self.consumer_name(), envelope.message_id)
            .await?
        {
            return Ok(self.inbox_hit());
        }

        let trigger = Trigger::from_message_type(&envelope.message_type)
            .ok_or_else(|| SagaError::UnsupportedMessage(envelope.message_type.clone()))?;
        let message = CheckoutMessage::from_envelope(envelope)?;

        let attempts = self.config.max_conflict_retries + 1;
        for attempt in 1..=attempts {
            match self.try_apply(envelope, trigger, &message).await {
                Ok(outcome) => return Ok(outcome),
                Err(SagaError::Store(StoreError::DuplicateMessage { .. })) => {
                    return Ok(self.inbox_hit());
                }
                Err(SagaError::Store(e)) if e.is_conflict() => {
                    metrics::counter!("saga_concurrency_conflicts_total").increment(1);
                    debug!(attempt, error = %e, "concurrency conflict, reloading saga");
                }
                Err(e) => return Err(e),
            }
        }

        Err(SagaError::ConflictRetriesExhausted {
            correlation_id: envelope.correlation_id,
            attempts,
        })
    }

    /// One load-decide-commit pass against the version just read.
    async fn try_apply(
        &self,
        envelope: &MessageEnvelope,
        trigger: Trigger,
        message: &CheckoutMessage,
    ) -> Result<HandleOutcome> {
        let correlation_id = envelope.correlation_id;
        let loaded = self.store.load(correlation_id).await?;
        let from = loaded
            .as_ref()
            .map(|(saga, _)| saga.current_state)
            .unwrap_or_default();
        let now = self.clock.now();

        match transitions::decide(from, trigger, self.config.timeout_action) {
            Decision::Duplicate => {
                debug!(state = %from, "duplicate message ignored");
                self.store
                    .record_processed(TransitionEffects::processed(
                        self.consumer_name(),
                        envelope.message_id,
                    ))
                    .await?;
                Ok(HandleOutcome::Duplicate { state: from })
            }

            Decision::Park(kind) => {
                let reason = match kind {
                    FaultKind::Orphaned => format!("no saga exists for order {correlation_id}"),
                    _ => format!("{} is not valid in state {from}", envelope.message_type),
                };
                warn!(
                    state = %from,
                    fault_kind = %kind,
                    causation_id = ?envelope.causation_id,
                    %reason,
                    "message parked"
                );
                let fault = FaultRecord::new(kind, self.consumer_name(), envelope, reason)
                    .parked_at(now);
                self.store
                    .record_processed(
                        TransitionEffects::processed(self.consumer_name(), envelope.message_id)
                            .with_fault(fault),
                    )
                    .await?;
                metrics::counter!("saga_faults_total", "kind" => kind.as_str()).increment(1);
                Ok(HandleOutcome::Parked { kind })
            }

            Decision::Transition { to, emits, fault } => {
                let (mut saga, expected) = match loaded {
                    Some((saga, version)) => (saga, Some(version)),
                    None => match message {
                        CheckoutMessage::UserCheckedOut(event) => {
                            (OrderCheckoutSaga::start(event, now), None)
                        }
                        other => {
                            return Err(SagaError::InvalidTransitionTable(format!(
                                "{} cannot start a saga",
                                other.message_type()
                            )));
                        }
                    },
                };

                let mut effects =
                    TransitionEffects::processed(self.consumer_name(), envelope.message_id);
                match fault {
                    Some(kind) => {
                        let reason = match message {
                            CheckoutMessage::SagaTimedOut(timeout) => {
                                format!("no basket reply before {}", timeout.deadline)
                            }
                            _ => format!("{} faulted the saga", envelope.message_type),
                        };
                        saga.fault(reason.clone(), now);
                        effects = effects.with_fault(
                            FaultRecord::new(kind, self.consumer_name(), envelope, reason)
                                .parked_at(now),
                        );
                        metrics::counter!("saga_faults_total", "kind" => kind.as_str())
                            .increment(1);
                    }
                    None => saga.transition_to(to, now),
                }
                if let Some(command) = emits {
                    effects = effects.with_outbox(command_envelope(&saga, command, envelope)?);
                }

                let version = match expected {
                    None => self.store.create(&saga, effects).await?,
                    Some(expected) => {
                        self.store
                            .commit_transition(correlation_id, expected, &saga, effects)
                            .await?
                    }
                };

                info!(
                    from = %from,
                    to = %to,
                    %version,
                    emitted = emits.map(|c| c.message_type()),
                    "saga transitioned"
                );
                metrics::counter!(
                    "saga_transitions_total",
                    "from" => from.as_str(),
                    "to" => to.as_str()
                )
                .increment(1);

                Ok(HandleOutcome::Applied {
                    from,
                    to,
                    version,
                    emitted: emits.map(|c| c.message_type()),
                })
            }
        }
    }

    fn inbox_hit(&self) -> HandleOutcome {
        debug!(consumer = self.consumer_name(), "inbox hit, message already processed");
        metrics::counter!("saga_inbox_hits_total").increment(1);
        HandleOutcome::InboxHit
    }
}

fn command_envelope(
    saga: &OrderCheckoutSaga,
    command: Command,
    cause: &MessageEnvelope,
) -> Result<MessageEnvelope> {
    let envelope = match command {
        Command::PlaceOrder => MessageEnvelope::wrap_caused_by(&saga.place_order(), cause.message_id),
        Command::CompleteOrder => {
            MessageEnvelope::wrap_caused_by(&saga.complete_order(), cause.message_id)
        }
        Command::CancelOrder => {
            MessageEnvelope::wrap_caused_by(&saga.cancel_order(), cause.message_id)
        }
    };
    Ok(envelope?)
}
