//! Redis Streams broker.
//!
//! Click messages are appended to a stream with a single `payload` field and
//! consumed through a consumer group:
//!
//! 1. `XPENDING ... IDLE` finds messages that were delivered but not
//!    acknowledged for longer than the redelivery backoff; `XCLAIM` hands them
//!    to the polling consumer (this increments their delivery counter)
//! 2. `XREADGROUP ... >` reads new messages
//! 3. `XACK` + `XDEL` settle a message so the stream only holds unsettled entries
//! 4. Dead letters are copied to a separate stream before being settled

use super::service::{BrokerError, BrokerResult, ClickBroker, DeadLetter, Delivery};
use async_trait::async_trait;
use chrono::Utc;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadOptions,
    StreamReadReply,
};
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use std::time::Duration;
use tracing::{debug, info, warn};

const PAYLOAD_FIELD: &str = "payload";

/// Stream names and redelivery policy.
#[derive(Debug, Clone)]
pub struct RedisStreamSettings {
    pub stream: String,
    pub dead_letter_stream: String,
    pub group: String,
    /// Idle time after which a pending message is redelivered.
    pub redelivery_backoff: Duration,
}

/// [`ClickBroker`] backed by a Redis stream and consumer group.
pub struct RedisStreamBroker {
    conn: ConnectionManager,
    settings: RedisStreamSettings,
}

fn operation_error(op: &str, e: RedisError) -> BrokerError {
    BrokerError::OperationError(format!("{}: {}", op, e))
}

impl RedisStreamBroker {
    /// Connects to Redis and makes sure the stream and consumer group exist.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionError`] if Redis cannot be reached.
    pub async fn connect(redis_url: &str, settings: RedisStreamSettings) -> BrokerResult<Self> {
        info!("Connecting to Redis broker");

        let client = Client::open(redis_url).map_err(|e| {
            BrokerError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            BrokerError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        let broker = Self { conn, settings };
        broker.ensure_group().await?;

        info!(
            stream = %broker.settings.stream,
            group = %broker.settings.group,
            "Connected to Redis broker"
        );
        Ok(broker)
    }

    pub fn settings(&self) -> &RedisStreamSettings {
        &self.settings
    }

    /// Creates the consumer group (and the stream) if missing.
    async fn ensure_group(&self) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        let result: Result<(), RedisError> = conn
            .xgroup_create_mkstream(&self.settings.stream, &self.settings.group, "0")
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(BrokerError::ConnectionError(format!(
                "Failed to create consumer group: {}",
                e
            ))),
        }
    }

    /// Claims pending messages that have been idle for at least the redelivery backoff.
    ///
    /// The idle filter runs inside Redis (`XPENDING ... IDLE`), so messages
    /// still held by live consumers never hide idle ones further down the
    /// pending list.
    async fn reclaim(&self, consumer: &str, max: usize) -> BrokerResult<Vec<Delivery>> {
        let mut conn = self.conn.clone();
        let min_idle_ms = self.settings.redelivery_backoff.as_millis() as usize;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.settings.stream)
            .arg(&self.settings.group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(|e| operation_error("XPENDING", e))?;

        let idle: Vec<(String, usize)> = pending
            .ids
            .into_iter()
            .map(|p| (p.id, p.times_delivered))
            .collect();

        if idle.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = idle.iter().map(|(id, _)| id.as_str()).collect();
        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.settings.stream,
                &self.settings.group,
                consumer,
                min_idle_ms,
                &ids,
            )
            .await
            .map_err(|e| operation_error("XCLAIM", e))?;

        let deliveries = claimed
            .ids
            .into_iter()
            .map(|entry| {
                let previous = idle
                    .iter()
                    .find(|(id, _)| *id == entry.id)
                    .map(|(_, n)| *n)
                    .unwrap_or(0);
                to_delivery(entry, previous as u32 + 1)
            })
            .collect::<Vec<_>>();

        if !deliveries.is_empty() {
            debug!(consumer, count = deliveries.len(), "Reclaimed idle click messages");
        }

        Ok(deliveries)
    }

    async fn read_new(&self, consumer: &str, max: usize) -> BrokerResult<Vec<Delivery>> {
        let mut conn = self.conn.clone();
        let options = StreamReadOptions::default()
            .group(&self.settings.group, consumer)
            .count(max);

        let reply: Result<StreamReadReply, RedisError> = conn
            .xread_options(&[&self.settings.stream], &[">"], &options)
            .await;

        match reply {
            Ok(reply) => Ok(reply
                .keys
                .into_iter()
                .flat_map(|key| key.ids)
                .map(|entry| to_delivery(entry, 1))
                .collect()),
            Err(e) if e.to_string().contains("NOGROUP") => {
                // The stream was deleted underneath us.
                warn!("Consumer group missing, recreating");
                self.ensure_group().await?;
                Ok(Vec::new())
            }
            Err(e) => Err(operation_error("XREADGROUP", e)),
        }
    }

    /// Lists up to `limit` dead letters, oldest first.
    pub async fn list_dead_letters(&self, limit: usize) -> BrokerResult<Vec<DeadLetter>> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn
            .xrange_count(&self.settings.dead_letter_stream, "-", "+", limit)
            .await
            .map_err(|e| operation_error("XRANGE", e))?;

        Ok(reply.ids.into_iter().map(to_dead_letter).collect())
    }

    /// Re-publishes a dead letter to the click stream and removes it from the sink.
    ///
    /// Returns `false` if no dead letter with `id` exists.
    pub async fn replay_dead_letter(&self, id: &str) -> BrokerResult<bool> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn
            .xrange(&self.settings.dead_letter_stream, id, id)
            .await
            .map_err(|e| operation_error("XRANGE", e))?;

        let Some(entry) = reply.ids.into_iter().next() else {
            return Ok(false);
        };
        let letter = to_dead_letter(entry);

        self.publish(&letter.payload).await?;

        let _: i64 = conn
            .xdel(&self.settings.dead_letter_stream, &[id])
            .await
            .map_err(|e| operation_error("XDEL", e))?;

        info!(id, original_id = %letter.original_id, "Replayed dead letter");
        Ok(true)
    }

    /// Replays every dead letter. Returns the number of replayed messages.
    pub async fn replay_all_dead_letters(&self) -> BrokerResult<usize> {
        let mut replayed = 0;
        loop {
            let batch = self.list_dead_letters(100).await?;
            if batch.is_empty() {
                return Ok(replayed);
            }
            for letter in batch {
                if self.replay_dead_letter(&letter.id).await? {
                    replayed += 1;
                }
            }
        }
    }

    /// Deletes the whole dead-letter stream. Returns the number of removed entries.
    pub async fn purge_dead_letters(&self) -> BrokerResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn
            .xlen(&self.settings.dead_letter_stream)
            .await
            .map_err(|e| operation_error("XLEN", e))?;
        let _: i64 = conn
            .del(&self.settings.dead_letter_stream)
            .await
            .map_err(|e| operation_error("DEL", e))?;

        Ok(len)
    }

    /// Number of unsettled messages in the click stream.
    pub async fn backlog(&self) -> BrokerResult<usize> {
        let mut conn = self.conn.clone();
        conn.xlen(&self.settings.stream)
            .await
            .map_err(|e| operation_error("XLEN", e))
    }
}

fn to_delivery(entry: StreamId, attempt: u32) -> Delivery {
    let payload = entry.get::<String>(PAYLOAD_FIELD).unwrap_or_default();
    Delivery {
        id: entry.id,
        payload,
        attempt,
    }
}

fn to_dead_letter(entry: StreamId) -> DeadLetter {
    let field = |name: &str| entry.get::<String>(name).unwrap_or_default();
    DeadLetter {
        id: entry.id.clone(),
        original_id: field("original_id"),
        payload: field(PAYLOAD_FIELD),
        attempts: field("attempts").parse().unwrap_or(0),
        reason: field("reason"),
        dead_lettered_at: field("dead_lettered_at"),
    }
}

#[async_trait]
impl ClickBroker for RedisStreamBroker {
    async fn publish(&self, payload: &str) -> BrokerResult<String> {
        let mut conn = self.conn.clone();
        conn.xadd(&self.settings.stream, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .map_err(|e| operation_error("XADD", e))
    }

    async fn fetch(&self, consumer: &str, max: usize) -> BrokerResult<Vec<Delivery>> {
        let mut deliveries = self.reclaim(consumer, max).await?;

        let remaining = max.saturating_sub(deliveries.len());
        if remaining > 0 {
            deliveries.extend(self.read_new(consumer, remaining).await?);
        }

        Ok(deliveries)
    }

    async fn ack(&self, id: &str) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&self.settings.stream)
            .arg(&self.settings.group)
            .arg(id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.settings.stream)
            .arg(id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| operation_error("XACK", e))
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("XADD")
            .arg(&self.settings.dead_letter_stream)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&delivery.payload)
            .arg("original_id")
            .arg(&delivery.id)
            .arg("attempts")
            .arg(delivery.attempt)
            .arg("reason")
            .arg(reason)
            .arg("dead_lettered_at")
            .arg(Utc::now().to_rfc3339())
            .ignore()
            .cmd("XACK")
            .arg(&self.settings.stream)
            .arg(&self.settings.group)
            .arg(&delivery.id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.settings.stream)
            .arg(&delivery.id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| operation_error("dead-letter", e))
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        conn.ping::<()>().await.is_ok()
    }

    fn backend(&self) -> &'static str {
        "redis-streams"
    }
}
