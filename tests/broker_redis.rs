//! Redis Streams broker tests.
//!
//! Run with a Redis server available:
//! `REDIS_URL=redis://127.0.0.1:6379 cargo test --test broker_redis -- --ignored`

use linktrail::infrastructure::broker::{ClickBroker, RedisStreamBroker, RedisStreamSettings};
use rand::distr::{Alphanumeric, SampleString};
use redis::AsyncCommands;
use std::time::Duration;

const BACKOFF: Duration = Duration::from_millis(100);

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Stream names unique to one test run.
fn test_settings() -> RedisStreamSettings {
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), 8);
    RedisStreamSettings {
        stream: format!("test:clicks:{suffix}"),
        dead_letter_stream: format!("test:clicks:{suffix}:dead"),
        group: "test-consumers".to_string(),
        redelivery_backoff: BACKOFF,
    }
}

async fn connect() -> RedisStreamBroker {
    RedisStreamBroker::connect(&redis_url(), test_settings())
        .await
        .unwrap()
}

async fn cleanup(broker: &RedisStreamBroker) {
    let client = redis::Client::open(redis_url()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let settings = broker.settings();
    let _: () = conn
        .del(vec![settings.stream.clone(), settings.dead_letter_stream.clone()])
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_unacked_message_is_redelivered_then_dead_lettered() {
    let broker = connect().await;

    let id = broker.publish("payload-1").await.unwrap();

    let first = broker.fetch("worker-a", 10).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id, id);
    assert_eq!(first[0].payload, "payload-1");
    assert_eq!(first[0].attempt, 1);

    // Still inside the backoff window: nothing to hand out.
    assert!(broker.fetch("worker-b", 10).await.unwrap().is_empty());

    tokio::time::sleep(BACKOFF + Duration::from_millis(50)).await;

    let second = broker.fetch("worker-b", 10).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, id);
    assert_eq!(second[0].attempt, 2);

    broker.dead_letter(&second[0], "store down").await.unwrap();

    assert_eq!(broker.backlog().await.unwrap(), 0);
    let letters = broker.list_dead_letters(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].original_id, id);
    assert_eq!(letters[0].payload, "payload-1");
    assert_eq!(letters[0].attempts, 2);
    assert_eq!(letters[0].reason, "store down");

    tokio::time::sleep(BACKOFF + Duration::from_millis(50)).await;
    assert!(broker.fetch("worker-c", 10).await.unwrap().is_empty());

    cleanup(&broker).await;
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_ack_removes_message() {
    let broker = connect().await;

    broker.publish("payload-1").await.unwrap();
    let delivery = broker.fetch("worker-a", 10).await.unwrap().remove(0);
    broker.ack(&delivery.id).await.unwrap();

    assert_eq!(broker.backlog().await.unwrap(), 0);
    tokio::time::sleep(BACKOFF + Duration::from_millis(50)).await;
    assert!(broker.fetch("worker-b", 10).await.unwrap().is_empty());

    cleanup(&broker).await;
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_idle_message_is_reclaimed_behind_busy_one() {
    let broker = connect().await;

    let older = broker.publish("older").await.unwrap();
    let newer = broker.publish("newer").await.unwrap();
    assert_eq!(broker.fetch("crashed", 10).await.unwrap().len(), 2);

    tokio::time::sleep(BACKOFF + Duration::from_millis(50)).await;

    // Reclaiming the older message resets its idle time.
    let busy = broker.fetch("worker-a", 1).await.unwrap();
    assert_eq!(busy[0].id, older);

    let reclaimed = broker.fetch("worker-b", 1).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, newer);
    assert_eq!(reclaimed[0].attempt, 2);

    cleanup(&broker).await;
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_replayed_dead_letter_is_delivered_again() {
    let broker = connect().await;

    broker.publish("payload-1").await.unwrap();
    let delivery = broker.fetch("worker-a", 10).await.unwrap().remove(0);
    broker.dead_letter(&delivery, "store down").await.unwrap();

    assert_eq!(broker.replay_all_dead_letters().await.unwrap(), 1);
    assert!(broker.list_dead_letters(10).await.unwrap().is_empty());

    let replayed = broker.fetch("worker-a", 10).await.unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].payload, "payload-1");
    assert_eq!(replayed[0].attempt, 1);

    assert!(!broker.replay_dead_letter("0-1").await.unwrap());

    cleanup(&broker).await;
}
