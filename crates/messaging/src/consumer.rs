//! Consumer worker: parallel delivery with bounded retry and dead-lettering.

use std::sync::Arc;

use async_trait::async_trait;
use contracts::MessageEnvelope;
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::bus::Subscription;
use crate::retry::RetryPolicy;

/// A handler failed to process a delivery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct HandlerError {
    reason: String,
}

impl HandlerError {
    /// Creates a handler error with a human-readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the failure reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Processes deliveries for one logical consumer.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Consumer name, used as the inbox dedup namespace.
    fn consumer_name(&self) -> &str;

    /// Message types this handler subscribes to.
    fn message_types(&self) -> Vec<&'static str>;

    /// Handles one delivery. An error triggers a retry after back-off.
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError>;
}

/// Destination for messages that exhausted their delivery attempts.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(
        &self,
        consumer: &str,
        envelope: &MessageEnvelope,
        attempts: u32,
        reason: &str,
    ) -> Result<(), HandlerError>;
}

/// Final outcome of delivering one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The handler accepted the message.
    Acked { attempts: u32 },
    /// Every attempt failed; the message went to the dead-letter sink.
    DeadLettered { attempts: u32 },
    /// Every attempt failed and the dead-letter sink kept rejecting the
    /// message. Only the error log and `consumer_lost_messages_total` keep a
    /// trace of it.
    Lost { attempts: u32 },
}

/// Consumer tuning.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum deliveries processed in parallel.
    pub concurrency: usize,
    /// Retry schedule for a failing delivery.
    pub retry: RetryPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Pulls deliveries from a [`Subscription`] and runs them through a handler.
///
/// Deliveries run concurrently up to `concurrency`; there is no per-order
/// serialization here, handlers resolve races themselves.
pub struct Consumer<H, D> {
    handler: Arc<H>,
    dead_letters: Arc<D>,
    config: ConsumerConfig,
}

impl<H, D> Consumer<H, D>
where
    H: MessageHandler + 'static,
    D: DeadLetterSink + 'static,
{
    /// Creates a consumer.
    pub fn new(handler: Arc<H>, dead_letters: Arc<D>, config: ConsumerConfig) -> Self {
        Self {
            handler,
            dead_letters,
            config,
        }
    }

    /// Delivers a single envelope with retries, outside the worker loop.
    pub async fn deliver(&self, envelope: &MessageEnvelope) -> DeliveryOutcome {
        deliver_with_retry(
            self.handler.as_ref(),
            self.dead_letters.as_ref(),
            &self.config.retry,
            envelope,
        )
        .await
    }

    /// Runs until the subscription closes or `shutdown` flips to true.
    ///
    /// In-flight deliveries are awaited before returning.
    pub async fn run(self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        let consumer = self.handler.consumer_name().to_string();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut in_flight = JoinSet::new();

        info!(%consumer, concurrency = self.config.concurrency, "consumer started");

        loop {
            tokio::select! {
                delivery = subscription.recv() => {
                    let Some(envelope) = delivery else {
                        info!(%consumer, "subscription closed");
                        break;
                    };
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    let handler = self.handler.clone();
                    let dead_letters = self.dead_letters.clone();
                    let retry = self.config.retry.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        deliver_with_retry(handler.as_ref(), dead_letters.as_ref(), &retry, &envelope)
                            .await
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(%consumer, "consumer shutting down");
                        break;
                    }
                }
            }

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(%consumer, error = %e, "delivery task panicked");
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(%consumer, error = %e, "delivery task panicked");
            }
        }
        info!(%consumer, "consumer stopped");
    }
}

async fn deliver_with_retry<H, D>(
    handler: &H,
    dead_letters: &D,
    retry: &RetryPolicy,
    envelope: &MessageEnvelope,
) -> DeliveryOutcome
where
    H: MessageHandler + ?Sized,
    D: DeadLetterSink + ?Sized,
{
    let consumer = handler.consumer_name();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match handler.handle(envelope).await {
            Ok(()) => {
                debug!(%consumer, message_id = %envelope.message_id, attempt, "delivery acked");
                return DeliveryOutcome::Acked { attempts: attempt };
            }
            Err(e) if retry.is_exhausted(attempt) => {
                warn!(
                    %consumer,
                    message_id = %envelope.message_id,
                    message_type = %envelope.message_type,
                    correlation_id = %envelope.correlation_id,
                    attempts = attempt,
                    error = %e,
                    "delivery attempts exhausted, dead-lettering"
                );
                return park(dead_letters, retry, consumer, envelope, attempt, e.reason()).await;
            }
            Err(e) => {
                let delay = retry.backoff(attempt);
                debug!(
                    %consumer,
                    message_id = %envelope.message_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "delivery failed, retrying"
                );
                metrics::counter!("consumer_retries_total", "consumer" => consumer.to_string())
                    .increment(1);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Hands an exhausted delivery to the sink, retrying the sink on the same
/// back-off schedule.
async fn park<D>(
    dead_letters: &D,
    retry: &RetryPolicy,
    consumer: &str,
    envelope: &MessageEnvelope,
    attempts: u32,
    reason: &str,
) -> DeliveryOutcome
where
    D: DeadLetterSink + ?Sized,
{
    let mut sink_attempt = 0;
    loop {
        sink_attempt += 1;
        match dead_letters
            .dead_letter(consumer, envelope, attempts, reason)
            .await
        {
            Ok(()) => {
                metrics::counter!("consumer_dead_letters_total", "consumer" => consumer.to_string())
                    .increment(1);
                return DeliveryOutcome::DeadLettered { attempts };
            }
            Err(sink_err) if retry.is_exhausted(sink_attempt) => {
                error!(
                    %consumer,
                    message_id = %envelope.message_id,
                    message_type = %envelope.message_type,
                    correlation_id = %envelope.correlation_id,
                    sink_attempts = sink_attempt,
                    error = %sink_err,
                    "dead-letter sink kept rejecting message, message lost"
                );
                metrics::counter!("consumer_lost_messages_total", "consumer" => consumer.to_string())
                    .increment(1);
                return DeliveryOutcome::Lost { attempts };
            }
            Err(sink_err) => {
                warn!(
                    %consumer,
                    message_id = %envelope.message_id,
                    sink_attempt,
                    error = %sink_err,
                    "dead-letter sink rejected message, retrying"
                );
                tokio::time::sleep(retry.backoff(sink_attempt)).await;
            }
        }
    }
}
