//! Message broker for click events.
//!
//! Provides a [`ClickBroker`] trait with two implementations:
//! - [`RedisStreamBroker`] - Redis Streams with a consumer group and a dead-letter stream
//! - [`InMemoryBroker`] - In-process queue with the same redelivery semantics

mod memory;
mod redis_stream;
mod service;

pub use memory::InMemoryBroker;
pub use redis_stream::{RedisStreamBroker, RedisStreamSettings};
pub use service::{BrokerError, BrokerResult, ClickBroker, DeadLetter, Delivery};

#[cfg(test)]
pub use service::MockClickBroker;
