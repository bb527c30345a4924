#![allow(dead_code)]

use axum::extract::ConnectInfo;
use linktrail::application::services::{LinkService, LinkSettings};
use linktrail::domain::click_event::ClickEvent;
use linktrail::domain::click_publisher;
use linktrail::domain::repositories::LinkRepository;
use linktrail::infrastructure::broker::{ClickBroker, InMemoryBroker};
use linktrail::infrastructure::cache::{CacheService, MemoryCache};
use linktrail::infrastructure::persistence::{MemoryClickRepository, MemoryLinkRepository};
use linktrail::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::Layer;

pub const BASE_URL: &str = "https://s.example.com";

/// In-memory backends behind a test [`AppState`], kept for assertions and
/// outage simulation.
pub struct Backends {
    pub links: Arc<MemoryLinkRepository>,
    pub clicks: Arc<MemoryClickRepository>,
    pub cache: Arc<MemoryCache>,
    pub broker: Arc<InMemoryBroker>,
}

pub fn test_settings() -> LinkSettings {
    LinkSettings {
        base_url: BASE_URL.to_string(),
        code_length: 7,
        max_generation_attempts: 5,
        cache_ttl: 3600,
        store_timeout: Duration::from_millis(500),
        cache_timeout: Duration::from_millis(100),
    }
}

pub fn create_backends() -> Backends {
    Backends {
        links: Arc::new(MemoryLinkRepository::new()),
        clicks: Arc::new(MemoryClickRepository::new()),
        cache: Arc::new(MemoryCache::new(Duration::from_secs(3600))),
        broker: Arc::new(InMemoryBroker::new(Duration::ZERO)),
    }
}

/// Builds application state over fresh in-memory backends.
///
/// The returned receiver is the click buffer; nothing drains it unless the
/// test spawns a publisher relay.
pub fn create_test_state() -> (AppState, Backends, mpsc::Receiver<ClickEvent>) {
    let backends = create_backends();
    let (state, rx) = state_for(&backends, 100);
    (state, backends, rx)
}

pub fn state_for(
    backends: &Backends,
    queue_capacity: usize,
) -> (AppState, mpsc::Receiver<ClickEvent>) {
    let (publisher, rx) = click_publisher::channel(queue_capacity);

    let links: Arc<dyn LinkRepository> = backends.links.clone();
    let cache: Arc<dyn CacheService> = backends.cache.clone();
    let broker: Arc<dyn ClickBroker> = backends.broker.clone();

    let link_service = Arc::new(LinkService::new(
        links.clone(),
        cache.clone(),
        publisher.clone(),
        test_settings(),
    ));

    (
        AppState::new(link_service, links, cache, broker, publisher),
        rx,
    )
}

pub async fn create_test_link(backends: &Backends, code: &str, url: &str) {
    backends
        .links
        .create(linktrail::domain::entities::NewLink {
            code: code.to_string(),
            long_url: url.to_string(),
        })
        .await
        .unwrap();
}

/// Inserts `ConnectInfo` so peer-address based layers work without a socket.
#[derive(Clone)]
pub struct MockConnectInfoLayer;

impl<S> Layer<S> for MockConnectInfoLayer {
    type Service = MockConnectInfoService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MockConnectInfoService { inner }
    }
}

#[derive(Clone)]
pub struct MockConnectInfoService<S> {
    inner: S,
}

impl<S, B> tower::Service<axum::http::Request<B>> for MockConnectInfoService<S>
where
    S: tower::Service<axum::http::Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: axum::http::Request<B>) -> Self::Future {
        let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        self.inner.call(req)
    }
}
