//! In-process broker.
//!
//! Used when no external broker is configured and throughout the test suite.
//! Messages live only as long as the process, but delivery semantics match
//! the Redis Streams broker: unacknowledged messages are redelivered after the
//! backoff, with an increasing attempt count.

use super::service::{BrokerError, BrokerResult, ClickBroker, DeadLetter, Delivery};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug)]
struct Entry {
    payload: String,
    deliveries: u32,
    last_delivered: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    entries: BTreeMap<u64, Entry>,
    dead_letters: Vec<DeadLetter>,
}

/// [`ClickBroker`] keeping messages in memory.
pub struct InMemoryBroker {
    state: Mutex<State>,
    redelivery_backoff: Duration,
    available: AtomicBool,
    published: AtomicU64,
}

impl InMemoryBroker {
    pub fn new(redelivery_backoff: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            redelivery_backoff,
            available: AtomicBool::new(true),
            published: AtomicU64::new(0),
        }
    }

    /// Simulates an outage: while unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Unsettled messages, delivered or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Messages delivered at least once and not yet settled.
    pub async fn pending_count(&self) -> usize {
        self.state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.deliveries > 0)
            .count()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Total number of messages accepted by [`ClickBroker::publish`].
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> BrokerResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::ConnectionError(
                "in-memory broker marked unavailable".to_string(),
            ))
        }
    }
}

fn parse_id(id: &str) -> BrokerResult<u64> {
    id.parse()
        .map_err(|_| BrokerError::OperationError(format!("unknown message id '{}'", id)))
}

#[async_trait]
impl ClickBroker for InMemoryBroker {
    async fn publish(&self, payload: &str) -> BrokerResult<String> {
        self.ensure_available()?;

        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.entries.insert(
            id,
            Entry {
                payload: payload.to_string(),
                deliveries: 0,
                last_delivered: None,
            },
        );
        self.published.fetch_add(1, Ordering::SeqCst);

        Ok(id.to_string())
    }

    async fn fetch(&self, _consumer: &str, max: usize) -> BrokerResult<Vec<Delivery>> {
        self.ensure_available()?;

        let now = Instant::now();
        let backoff = self.redelivery_backoff;
        let mut state = self.state.lock().await;

        let idle = state
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.last_delivered, Some(at) if now.duration_since(at) >= backoff))
            .map(|(id, _)| *id);
        let fresh = state
            .entries
            .iter()
            .filter(|(_, e)| e.last_delivered.is_none())
            .map(|(id, _)| *id);
        let ids: Vec<u64> = idle.chain(fresh).take(max).collect();

        let mut deliveries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.deliveries += 1;
                entry.last_delivered = Some(now);
                deliveries.push(Delivery {
                    id: id.to_string(),
                    payload: entry.payload.clone(),
                    attempt: entry.deliveries,
                });
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, id: &str) -> BrokerResult<()> {
        self.ensure_available()?;
        let id = parse_id(id)?;
        self.state.lock().await.entries.remove(&id);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()> {
        self.ensure_available()?;
        let id = parse_id(&delivery.id)?;

        let mut state = self.state.lock().await;
        state.entries.remove(&id);
        let sink_id = format!("dl-{}", state.dead_letters.len() + 1);
        state.dead_letters.push(DeadLetter {
            id: sink_id,
            original_id: delivery.id.clone(),
            payload: delivery.payload.clone(),
            attempts: delivery.attempt,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now().to_rfc3339(),
        });

        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
