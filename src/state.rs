//! Shared application state injected into handlers.

use std::sync::Arc;

use crate::application::services::LinkService;
use crate::domain::click_publisher::ClickPublisher;
use crate::domain::repositories::LinkRepository;
use crate::infrastructure::broker::ClickBroker;
use crate::infrastructure::cache::CacheService;

/// Handles to every service a request may need.
///
/// Cheap to clone: everything is behind an `Arc` or is itself a handle.
#[derive(Clone)]
pub struct AppState {
    pub link_service: Arc<LinkService>,
    /// Store handle used by the health check.
    pub links: Arc<dyn LinkRepository>,
    pub cache: Arc<dyn CacheService>,
    pub broker: Arc<dyn ClickBroker>,
    pub click_publisher: ClickPublisher,
}

impl AppState {
    pub fn new(
        link_service: Arc<LinkService>,
        links: Arc<dyn LinkRepository>,
        cache: Arc<dyn CacheService>,
        broker: Arc<dyn ClickBroker>,
        click_publisher: ClickPublisher,
    ) -> Self {
        Self {
            link_service,
            links,
            cache,
            broker,
            click_publisher,
        }
    }
}
