//! Outbox dispatcher: publishes committed outgoing messages.

use std::time::Duration;

use messaging::{MessageBus, RetryPolicy};
use saga_store::OutboxStore;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Idle wait after the outbox drained.
    pub poll_interval: Duration,
    /// Rows fetched per pass.
    pub batch_size: usize,
    /// Back-off after a failed publish. `max_attempts` is ignored: the
    /// dispatcher never gives up on a row.
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            retry: RetryPolicy::default().with_max_backoff(Duration::from_secs(30)),
        }
    }
}

impl DispatcherConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Result of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub published: usize,
    /// Set when the pass stopped at a row the bus rejected.
    pub failure: Option<String>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Moves pending outbox rows onto the bus in sequence order.
///
/// A row is marked sent only after the bus acknowledged it, so a crash
/// between publish and mark produces a second publish later. Consumers
/// deduplicate by message id.
pub struct OutboxDispatcher<O, B> {
    outbox: O,
    bus: B,
    config: DispatcherConfig,
}

impl<O, B> OutboxDispatcher<O, B>
where
    O: OutboxStore,
    B: MessageBus,
{
    pub fn new(outbox: O, bus: B, config: DispatcherConfig) -> Self {
        Self {
            outbox,
            bus,
            config,
        }
    }

    /// Publishes one batch, stopping at the first failure so later rows
    /// never overtake an earlier one.
    pub async fn dispatch_pending(&self) -> Result<DispatchReport> {
        let rows = self.outbox.pending(self.config.batch_size).await?;
        let mut report = DispatchReport::default();

        for row in rows {
            match self.bus.publish(&row.envelope).await {
                Ok(()) => {
                    self.outbox.mark_sent(row.sequence).await?;
                    metrics::counter!(
                        "outbox_published_total",
                        "message_type" => row.envelope.message_type.clone()
                    )
                    .increment(1);
                    debug!(
                        sequence = row.sequence,
                        message_id = %row.envelope.message_id,
                        message_type = %row.envelope.message_type,
                        "outbox message published"
                    );
                    report.published += 1;
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.outbox
                        .record_attempt_failure(row.sequence, &reason)
                        .await?;
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    warn!(
                        sequence = row.sequence,
                        message_id = %row.envelope.message_id,
                        attempts = row.attempts + 1,
                        transient = e.is_transient(),
                        error = %e,
                        "outbox publish failed"
                    );
                    report.failure = Some(reason);
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Runs until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox dispatcher started"
        );
        let mut consecutive_failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.dispatch_pending().await {
                Ok(report) if !report.is_complete() => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    self.config.retry.backoff(consecutive_failures)
                }
                Ok(report) if report.published >= self.config.batch_size => {
                    consecutive_failures = 0;
                    continue;
                }
                Ok(_) => {
                    consecutive_failures = 0;
                    self.config.poll_interval
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    error!(error = %e, "outbox dispatch pass failed");
                    self.config.retry.backoff(consecutive_failures)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("outbox dispatcher stopped");
    }
}
