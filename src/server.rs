//! HTTP server initialization and runtime setup.
//!
//! Handles database connections, cache and broker setup, click pipeline
//! spawning, and the Axum server lifecycle including graceful shutdown.

use crate::application::services::{LinkService, LinkSettings};
use crate::config::Config;
use crate::domain::click_publisher::{self, PublisherSettings, run_click_publisher};
use crate::domain::click_worker::{ConsumerSettings, run_click_workers};
use crate::domain::repositories::{ClickRepository, LinkRepository};
use crate::infrastructure::broker::{
    ClickBroker, InMemoryBroker, RedisStreamBroker, RedisStreamSettings,
};
use crate::infrastructure::cache::{CacheService, NullCache, RedisCache};
use crate::infrastructure::persistence::{PgClickRepository, PgLinkRepository};
use crate::routes::app_router;
use crate::state::AppState;

use anyhow::{Context, Result};
use axum::ServiceExt;
use axum::extract::Request;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the HTTP server with the given configuration.
///
/// Initializes:
/// - PostgreSQL connection pool
/// - Apply migrations
/// - Redis cache (or NullCache fallback)
/// - Click broker (Redis Streams or in-process fallback)
/// - Click publisher relay and consumer workers
/// - Axum HTTP server
///
/// On SIGINT/SIGTERM the server stops accepting requests, the publisher relay
/// drains what is already buffered, and the workers stop after the message
/// they are processing.
///
/// # Errors
///
/// Returns an error if:
/// - Database connection or migration fails
/// - Server bind fails
/// - Server runtime error occurs
pub async fn run(config: Config) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let cache = connect_cache(&config).await;
    let broker = connect_broker(&config).await;

    let pool = Arc::new(pool);
    let links: Arc<dyn LinkRepository> = Arc::new(PgLinkRepository::new(pool.clone()));
    let clicks: Arc<dyn ClickRepository> = Arc::new(PgClickRepository::new(pool.clone()));

    let (click_publisher, click_rx) = click_publisher::channel(config.click_queue_capacity);
    let relay = tokio::spawn(run_click_publisher(
        click_rx,
        broker.clone(),
        publisher_settings(&config),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = run_click_workers(
        broker.clone(),
        clicks,
        consumer_settings(&config),
        shutdown_rx,
    );
    tracing::info!(workers = workers.len(), "Click workers started");

    let link_service = Arc::new(LinkService::new(
        links.clone(),
        cache.clone(),
        click_publisher.clone(),
        link_settings(&config),
    ));
    let state = AppState::new(link_service, links, cache, broker, click_publisher);

    let app = app_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("HTTP server stopped, draining click pipeline");

    // The router and with it every publisher handle is gone, so the relay
    // ends once its buffer is empty.
    match tokio::time::timeout(RELAY_DRAIN_TIMEOUT, relay).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Click publisher task failed: {}", e),
        Err(_) => tracing::warn!("Click publisher did not drain in time, remaining clicks dropped"),
    }

    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("Click worker task failed: {}", e);
        }
    }

    pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn connect_cache(config: &Config) -> Arc<dyn CacheService> {
    let Some(redis_url) = &config.redis_url else {
        tracing::info!("Cache disabled (NullCache)");
        return Arc::new(NullCache::new());
    };

    match RedisCache::connect(redis_url, config.cache_ttl_seconds).await {
        Ok(redis) => {
            tracing::info!("Cache enabled (Redis)");
            Arc::new(redis)
        }
        Err(e) => {
            tracing::warn!("Failed to connect to Redis: {}. Using NullCache.", e);
            Arc::new(NullCache::new())
        }
    }
}

async fn connect_broker(config: &Config) -> Arc<dyn ClickBroker> {
    let redelivery_backoff = Duration::from_millis(config.click_redelivery_backoff_ms);

    let Some(broker_url) = &config.broker_url else {
        tracing::warn!("No broker configured, using in-process broker: clicks are lost on restart");
        return Arc::new(InMemoryBroker::new(redelivery_backoff));
    };

    let settings = RedisStreamSettings {
        stream: config.click_stream.clone(),
        dead_letter_stream: config.click_dead_letter_stream.clone(),
        group: config.click_consumer_group.clone(),
        redelivery_backoff,
    };

    match RedisStreamBroker::connect(broker_url, settings).await {
        Ok(broker) => {
            tracing::info!("Click broker enabled (Redis Streams)");
            Arc::new(broker)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to broker: {}. Using in-process broker, clicks are lost on restart.",
                e
            );
            Arc::new(InMemoryBroker::new(redelivery_backoff))
        }
    }
}

pub fn link_settings(config: &Config) -> LinkSettings {
    LinkSettings {
        base_url: config.base_url.clone(),
        code_length: config.code_length,
        max_generation_attempts: config.max_generation_attempts,
        cache_ttl: config.cache_ttl_seconds,
        store_timeout: config.store_timeout(),
        cache_timeout: config.cache_timeout(),
    }
}

pub fn publisher_settings(config: &Config) -> PublisherSettings {
    PublisherSettings {
        timeout: config.broker_timeout(),
        max_retries: config.publish_max_retries,
        retry_base: Duration::from_millis(config.publish_retry_base_ms),
    }
}

pub fn consumer_settings(config: &Config) -> ConsumerSettings {
    ConsumerSettings {
        consumer_prefix: consumer_prefix(),
        concurrency: config.click_worker_concurrency,
        batch_size: config.click_batch_size,
        max_deliveries: config.click_max_deliveries,
        poll_interval: Duration::from_millis(config.click_poll_interval_ms),
        store_timeout: config.store_timeout(),
    }
}

/// Consumer names must be unique per process within the consumer group.
fn consumer_prefix() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "linktrail".to_string());
    format!("{}-{}", host, std::process::id())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
