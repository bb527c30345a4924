//! Broker trait and shared types for the click stream.

use async_trait::async_trait;

/// A message handed to a consumer.
///
/// `attempt` counts deliveries of this message, starting at 1. A message that
/// is not acknowledged is delivered again with a higher count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub payload: String,
    pub attempt: u32,
}

/// A message that exhausted its deliveries, as kept in the dead-letter sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: String,
    pub original_id: String,
    pub payload: String,
    pub attempts: u32,
    pub reason: String,
    pub dead_lettered_at: String,
}

/// Errors that can occur while talking to the broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    ConnectionError(String),

    #[error("Broker operation error: {0}")]
    OperationError(String),
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// At-least-once message queue carrying click messages.
///
/// A fetched message stays pending until [`ClickBroker::ack`] or
/// [`ClickBroker::dead_letter`] is called for it. Pending messages are handed
/// out again once they have been idle for the broker's redelivery backoff, so a
/// consumer crash never loses an unacknowledged message.
///
/// # Implementations
///
/// - [`crate::infrastructure::broker::RedisStreamBroker`] - Redis Streams consumer group
/// - [`crate::infrastructure::broker::InMemoryBroker`] - In-process queue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClickBroker: Send + Sync {
    /// Appends a message and returns its broker id.
    async fn publish(&self, payload: &str) -> BrokerResult<String>;

    /// Returns up to `max` deliveries for `consumer`: redeliveries of idle
    /// pending messages first, then new messages. Does not block.
    async fn fetch(&self, consumer: &str, max: usize) -> BrokerResult<Vec<Delivery>>;

    /// Acknowledges a message, removing it from the pending set.
    async fn ack(&self, id: &str) -> BrokerResult<()>;

    /// Moves a message to the dead-letter sink and acknowledges it.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()>;

    /// Checks if the broker is reachable.
    async fn health_check(&self) -> bool;

    /// Short backend name for health reporting.
    fn backend(&self) -> &'static str;
}
