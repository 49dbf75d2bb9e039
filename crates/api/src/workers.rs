//! Background workers hosted next to the HTTP server.

use std::sync::Arc;

use messaging::{Consumer, ConsumerConfig, MessageBus, MessageHandler};
use saga::{
    BasketParticipant, InMemoryEmailSender, NotificationParticipant, OrderCheckoutOrchestrator,
    OrderCheckoutSaga, OrderingParticipant, OutboxDispatcher, SagaTimeoutMonitor,
    StoreDeadLetters,
};
use saga_store::ReliableStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;

/// Handles of the running workers.
pub struct Workers<St> {
    handles: Vec<JoinHandle<()>>,
    ordering: Option<Arc<OrderingParticipant<St>>>,
}

impl<St> Workers<St> {
    /// The Ordering fake, when demo participants run.
    pub fn ordering(&self) -> Option<Arc<OrderingParticipant<St>>> {
        self.ordering.clone()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker to stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task failed");
            }
        }
    }
}

/// Starts the orchestrator consumer, the outbox dispatcher, the timeout
/// monitor (if configured) and, in demo mode, the participant fakes.
///
/// Every worker stops when `shutdown` flips to true.
pub async fn start<St, B>(
    config: &Config,
    store: St,
    bus: B,
    shutdown: watch::Receiver<bool>,
) -> saga::Result<Workers<St>>
where
    St: ReliableStore<OrderCheckoutSaga> + Clone + 'static,
    B: MessageBus + Clone + 'static,
{
    let consumer_config = config.consumer_config();
    let mut handles = Vec::new();

    let orchestrator = Arc::new(OrderCheckoutOrchestrator::new(
        store.clone(),
        config.saga_config(),
    ));
    handles.push(
        spawn_consumer(
            &bus,
            &store,
            orchestrator.clone(),
            &consumer_config,
            shutdown.clone(),
        )
        .await?,
    );

    let dispatcher = OutboxDispatcher::new(store.clone(), bus.clone(), config.dispatcher_config());
    handles.push(tokio::spawn(dispatcher.run(shutdown.clone())));

    if let Some(monitor) = SagaTimeoutMonitor::from_config(orchestrator)? {
        handles.push(tokio::spawn(monitor.run(shutdown.clone())));
    }

    let ordering = if config.demo_participants {
        let ordering = Arc::new(OrderingParticipant::new(store.clone()));
        let basket = Arc::new(BasketParticipant::new(store.clone()));
        let notification = Arc::new(NotificationParticipant::new(
            store.clone(),
            InMemoryEmailSender::new(),
        ));
        handles.push(
            spawn_consumer(&bus, &store, ordering.clone(), &consumer_config, shutdown.clone())
                .await?,
        );
        handles.push(spawn_consumer(&bus, &store, basket, &consumer_config, shutdown.clone()).await?);
        handles.push(
            spawn_consumer(&bus, &store, notification, &consumer_config, shutdown.clone()).await?,
        );
        Some(ordering)
    } else {
        None
    };

    info!(
        workers = handles.len(),
        demo = config.demo_participants,
        "background workers started"
    );
    Ok(Workers { handles, ordering })
}

async fn spawn_consumer<St, B, H>(
    bus: &B,
    store: &St,
    handler: Arc<H>,
    config: &ConsumerConfig,
    shutdown: watch::Receiver<bool>,
) -> saga::Result<JoinHandle<()>>
where
    St: ReliableStore<OrderCheckoutSaga> + Clone + 'static,
    B: MessageBus,
    H: MessageHandler + 'static,
{
    let subscription = bus
        .subscribe(handler.consumer_name(), &handler.message_types())
        .await?;
    let consumer = Consumer::new(
        handler,
        Arc::new(StoreDeadLetters::new(store.clone())),
        config.clone(),
    );
    Ok(tokio::spawn(consumer.run(subscription, shutdown)))
}
