mod common;

use async_trait::async_trait;
use axum::{Router, routing::get};
use axum_test::TestServer;
use linktrail::api::handlers::health_handler;
use linktrail::application::services::LinkService;
use linktrail::domain::click_publisher;
use linktrail::domain::entities::{Link, NewLink};
use linktrail::domain::repositories::LinkRepository;
use linktrail::error::AppError;
use linktrail::state::AppState;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Store whose calls never complete.
struct HungLinkRepository;

#[async_trait]
impl LinkRepository for HungLinkRepository {
    async fn create(&self, _new_link: NewLink) -> Result<Link, AppError> {
        std::future::pending().await
    }

    async fn find_by_code(&self, _code: &str) -> Result<Option<Link>, AppError> {
        std::future::pending().await
    }

    async fn count(&self) -> Result<i64, AppError> {
        std::future::pending().await
    }

    async fn ping(&self) -> Result<(), AppError> {
        std::future::pending().await
    }
}

fn app(state: linktrail::state::AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

#[tokio::test]
async fn test_health_endpoint_success() {
    let (state, _backends, _rx) = common::create_test_state();
    let server = TestServer::new(app(state)).unwrap();

    let response = server.get("/health").await;

    response.assert_status_ok();

    let json = response.json::<serde_json::Value>();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["database"]["status"], "ok");
    assert_eq!(json["checks"]["cache"]["status"], "ok");
    assert_eq!(json["checks"]["broker"]["status"], "ok");
    assert_eq!(json["checks"]["click_queue"]["status"], "ok");
}

#[tokio::test]
async fn test_health_endpoint_structure() {
    let (state, _backends, _rx) = common::create_test_state();
    let server = TestServer::new(app(state)).unwrap();

    let json = server.get("/health").await.json::<serde_json::Value>();

    assert!(json.get("status").is_some());
    assert!(json.get("version").is_some());
    for check in ["database", "cache", "broker", "click_queue"] {
        assert!(json["checks"].get(check).is_some(), "missing {check}");
    }
}

#[tokio::test]
async fn test_health_degraded_when_database_down() {
    let (state, backends, _rx) = common::create_test_state();
    backends.links.set_available(false);
    let server = TestServer::new(app(state)).unwrap();

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), 503);
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["checks"]["database"]["status"], "error");
}

#[tokio::test]
async fn test_health_degraded_when_broker_down() {
    let (state, backends, _rx) = common::create_test_state();
    backends.broker.set_available(false);
    let server = TestServer::new(app(state)).unwrap();

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), 503);
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["checks"]["broker"]["status"], "error");
}

#[tokio::test]
async fn test_health_degraded_when_click_relay_stopped() {
    let (state, _backends, rx) = common::create_test_state();
    drop(rx);
    let server = TestServer::new(app(state)).unwrap();

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), 503);
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["checks"]["click_queue"]["status"], "error");
}

#[tokio::test]
async fn test_health_bounded_when_database_hangs() {
    let backends = common::create_backends();
    let (publisher, _rx) = click_publisher::channel(100);
    let links: Arc<dyn LinkRepository> = Arc::new(HungLinkRepository);
    let link_service = Arc::new(LinkService::new(
        links.clone(),
        backends.cache.clone(),
        publisher.clone(),
        common::test_settings(),
    ));
    let state = AppState::new(
        link_service,
        links,
        backends.cache.clone(),
        backends.broker.clone(),
        publisher,
    );
    let server = TestServer::new(app(state)).unwrap();

    let started = Instant::now();
    let response = server.get("/health").await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.status_code(), 503);
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["checks"]["database"]["status"], "error");
    assert_eq!(json["checks"]["cache"]["status"], "ok");
}
