//! Fire-and-forget click publishing.
//!
//! The resolve path hands events to a [`ClickPublisher`], which only ever
//! performs a non-blocking `try_send` into a bounded channel. A background
//! relay ([`run_click_publisher`]) drains the channel and appends each event to
//! the broker with bounded, jittered retries. Neither a full buffer nor a
//! broker outage can delay or fail a redirect; such clicks are dropped and
//! counted instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

use crate::domain::click_event::ClickEvent;
use crate::infrastructure::broker::{BrokerError, ClickBroker};
use crate::metrics;

/// Producer half of the click channel.
#[derive(Debug, Clone)]
pub struct ClickPublisher {
    tx: mpsc::Sender<ClickEvent>,
}

/// Creates a publisher and the receiver its relay drains.
pub fn channel(capacity: usize) -> (ClickPublisher, mpsc::Receiver<ClickEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ClickPublisher { tx }, rx)
}

impl ClickPublisher {
    /// Enqueues an event without waiting. Returns `false` if it was dropped.
    pub fn publish(&self, event: ClickEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(ev)) => {
                tracing::warn!(code = %ev.code, "Click queue full, dropping event");
                metrics::record_click_dropped("queue_full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => {
                tracing::warn!(code = %ev.code, "Click relay stopped, dropping event");
                metrics::record_click_dropped("relay_closed");
                false
            }
        }
    }

    /// Returns true once the relay has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Free slots in the buffer.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Retry policy of the relay.
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    /// Per-attempt broker timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry; doubles per retry.
    pub retry_base: Duration,
}

fn retry_strategy(settings: &PublisherSettings) -> impl Iterator<Item = Duration> {
    let factor = (settings.retry_base.as_millis() as u64 / 2).max(1);
    ExponentialBackoff::from_millis(2)
        .factor(factor)
        .max_delay(Duration::from_secs(5))
        .map(jitter)
        .take(settings.max_retries)
}

/// Appends one event to the broker, retrying transient failures.
pub async fn publish_with_retry(
    broker: &dyn ClickBroker,
    event: &ClickEvent,
    settings: &PublisherSettings,
) -> Result<String, BrokerError> {
    let payload = event
        .encode()
        .map_err(|e| BrokerError::OperationError(format!("encode click event: {}", e)))?;

    Retry::start(retry_strategy(settings), || async {
        let result = match timeout(settings.timeout, broker.publish(&payload)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::ConnectionError(format!(
                "publish timed out after {:?}",
                settings.timeout
            ))),
        };
        if let Err(e) = &result {
            tracing::debug!(code = %event.code, error = %e, "Click publish attempt failed");
        }
        result
    })
    .await
}

/// Relays buffered click events to the broker until every publisher is dropped.
///
/// Events that still fail after all retries are dropped; the redirect that
/// produced them has long been answered.
pub async fn run_click_publisher(
    mut rx: mpsc::Receiver<ClickEvent>,
    broker: Arc<dyn ClickBroker>,
    settings: PublisherSettings,
) {
    tracing::info!(backend = broker.backend(), "Click publisher started");

    while let Some(event) = rx.recv().await {
        match publish_with_retry(broker.as_ref(), &event, &settings).await {
            Ok(id) => {
                tracing::trace!(code = %event.code, id = %id, "Click published");
                metrics::record_click_published();
            }
            Err(e) => {
                tracing::warn!(
                    code = %event.code,
                    event_id = %event.event_id,
                    error = %e,
                    "Dropping click after publish retries"
                );
                metrics::record_click_dropped("broker_unavailable");
            }
        }
    }

    tracing::info!("Click publisher stopped");
}
