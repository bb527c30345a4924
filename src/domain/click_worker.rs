//! Durable click consumer.
//!
//! Workers poll the broker, persist each click through [`ClickRepository`] and
//! settle the message afterwards:
//!
//! | Outcome                    | Settlement                                   |
//! |----------------------------|----------------------------------------------|
//! | persisted or duplicate     | ack                                          |
//! | malformed payload          | ack (retrying cannot fix it)                 |
//! | store failure or timeout   | leave pending, redelivered after the backoff |
//! | store failure, last try    | dead-letter                                  |
//!
//! A message is only acknowledged after its click is durable, so a crash
//! between persist and ack leads to a redelivery that the idempotency key
//! turns into a no-op.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::domain::click_event::{MessageError, decode_click_message};
use crate::domain::entities::RecordOutcome;
use crate::domain::repositories::ClickRepository;
use crate::infrastructure::broker::{BrokerResult, ClickBroker, Delivery};
use crate::metrics;

/// Result of handling a single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Persisted,
    /// The click was already recorded by an earlier delivery.
    Duplicate,
    /// Malformed message, discarded.
    Dropped(MessageError),
    /// Transient failure; the message should be delivered again.
    Requeue(String),
}

/// Consumer pool configuration.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Consumer name prefix; workers are named `{consumer_prefix}-{n}`.
    pub consumer_prefix: String,
    pub concurrency: usize,
    pub batch_size: usize,
    /// Deliveries after which a failing message is dead-lettered.
    pub max_deliveries: u32,
    pub poll_interval: Duration,
    /// Timeout of a single store write.
    pub store_timeout: Duration,
}

/// Decodes a delivery and records its click.
pub async fn process_delivery(
    delivery: &Delivery,
    clicks: &dyn ClickRepository,
    store_timeout: Duration,
) -> ProcessOutcome {
    let click = match decode_click_message(&delivery.payload, &delivery.id) {
        Ok(click) => click,
        Err(e) => return ProcessOutcome::Dropped(e),
    };

    match timeout(store_timeout, clicks.record_click(click.into())).await {
        Ok(Ok(RecordOutcome::Inserted(_))) => ProcessOutcome::Persisted,
        Ok(Ok(RecordOutcome::Duplicate)) => ProcessOutcome::Duplicate,
        Ok(Err(e)) => ProcessOutcome::Requeue(e.to_string()),
        Err(_) => ProcessOutcome::Requeue(format!("store write timed out after {:?}", store_timeout)),
    }
}

/// Applies the settlement rule for `outcome` to the broker.
pub async fn settle(
    outcome: &ProcessOutcome,
    delivery: &Delivery,
    broker: &dyn ClickBroker,
    max_deliveries: u32,
) -> BrokerResult<()> {
    match outcome {
        ProcessOutcome::Persisted => {
            metrics::record_click_persisted();
            broker.ack(&delivery.id).await
        }
        ProcessOutcome::Duplicate => {
            tracing::debug!(id = %delivery.id, "Click already recorded");
            metrics::record_click_duplicate();
            broker.ack(&delivery.id).await
        }
        ProcessOutcome::Dropped(reason) => {
            tracing::warn!(id = %delivery.id, error = %reason, "Discarding malformed click message");
            metrics::record_click_invalid();
            broker.ack(&delivery.id).await
        }
        ProcessOutcome::Requeue(reason) if delivery.attempt >= max_deliveries => {
            tracing::error!(
                id = %delivery.id,
                attempts = delivery.attempt,
                error = %reason,
                "Click delivery exhausted, moving to dead letters"
            );
            metrics::record_click_dead_lettered();
            broker.dead_letter(delivery, reason).await
        }
        ProcessOutcome::Requeue(reason) => {
            tracing::warn!(
                id = %delivery.id,
                attempt = delivery.attempt,
                error = %reason,
                "Click not persisted, leaving for redelivery"
            );
            metrics::record_click_requeued();
            Ok(())
        }
    }
}

/// Spawns `settings.concurrency` consumer workers.
///
/// Workers stop when `shutdown` turns `true`; a message being processed at
/// that moment is finished and settled first.
pub fn run_click_workers(
    broker: Arc<dyn ClickBroker>,
    clicks: Arc<dyn ClickRepository>,
    settings: ConsumerSettings,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..settings.concurrency.max(1))
        .map(|n| {
            let consumer = format!("{}-{}", settings.consumer_prefix, n);
            tokio::spawn(run_worker(
                consumer,
                broker.clone(),
                clicks.clone(),
                settings.clone(),
                shutdown.clone(),
            ))
        })
        .collect()
}

async fn run_worker(
    consumer: String,
    broker: Arc<dyn ClickBroker>,
    clicks: Arc<dyn ClickRepository>,
    settings: ConsumerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(consumer = %consumer, backend = broker.backend(), "Click worker started");

    while !*shutdown.borrow() {
        let fetched = tokio::select! {
            _ = shutdown.changed() => break,
            fetched = broker.fetch(&consumer, settings.batch_size) => fetched,
        };

        let batch = match fetched {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(consumer = %consumer, error = %e, "Failed to fetch click messages");
                Vec::new()
            }
        };

        if batch.is_empty() {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(settings.poll_interval) => {}
            }
            continue;
        }

        let mut only_requeued = true;
        for delivery in batch {
            let outcome = process_delivery(&delivery, clicks.as_ref(), settings.store_timeout).await;
            only_requeued &= matches!(outcome, ProcessOutcome::Requeue(_));
            if let Err(e) = settle(&outcome, &delivery, broker.as_ref(), settings.max_deliveries).await {
                // Unsettled messages are redelivered, which the idempotency key absorbs.
                tracing::warn!(id = %delivery.id, error = %e, "Failed to settle click message");
            }

            if *shutdown.borrow() {
                break;
            }
        }

        // The store is failing; pace redeliveries instead of spending the
        // delivery budget in a tight loop.
        if only_requeued {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(settings.poll_interval) => {}
            }
        }
    }

    tracing::info!(consumer = %consumer, "Click worker stopped");
}
