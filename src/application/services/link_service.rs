//! Link creation and resolution service.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use crate::domain::click_event::ClickEvent;
use crate::domain::click_publisher::ClickPublisher;
use crate::domain::entities::{Link, NewLink};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheService;
use crate::metrics;
use crate::utils::code_generator::{generate_code, is_well_formed_code};
use crate::utils::url_normalizer::normalize_url;

/// Tunables of [`LinkService`].
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Prefix of generated short URLs, e.g. `https://s.example.com`.
    pub base_url: String,
    pub code_length: usize,
    pub max_generation_attempts: usize,
    /// TTL of cache entries, in seconds.
    pub cache_ttl: u64,
    pub store_timeout: Duration,
    pub cache_timeout: Duration,
}

/// Service for creating and resolving short links.
///
/// The store is the source of truth; the cache is a projection of it that is
/// written through on create and populated on resolve. Links are never updated
/// or deleted, so a cached entry can only ever be stale by being absent.
pub struct LinkService<L: LinkRepository + ?Sized = dyn LinkRepository> {
    link_repository: Arc<L>,
    cache: Arc<dyn CacheService>,
    publisher: ClickPublisher,
    settings: LinkSettings,
}

impl<L: LinkRepository + ?Sized> LinkService<L> {
    pub fn new(
        link_repository: Arc<L>,
        cache: Arc<dyn CacheService>,
        publisher: ClickPublisher,
        settings: LinkSettings,
    ) -> Self {
        Self {
            link_repository,
            cache,
            publisher,
            settings,
        }
    }

    /// Creates a short link with a freshly generated code.
    ///
    /// Every call returns a new code, even for a URL that was shortened before.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if the URL is not an absolute http(s) URL
    /// - [`AppError::GenerationExhausted`] if every generated code collided
    /// - [`AppError::StoreUnavailable`] if the store cannot be reached
    pub async fn create_short_link(&self, long_url: &str) -> Result<Link, AppError> {
        let normalized_url = normalize_url(long_url).map_err(|e| {
            AppError::bad_request("Invalid URL format", json!({ "reason": e.to_string() }))
        })?;

        let link = self.insert_with_fresh_code(normalized_url).await?;
        metrics::record_link_created();

        self.cache_put(&link.code, &link.long_url).await;

        tracing::info!(code = %link.code, "Short link created");
        Ok(link)
    }

    /// Inserts the URL under a random code, retrying on code collisions.
    async fn insert_with_fresh_code(&self, long_url: String) -> Result<Link, AppError> {
        let attempts = self.settings.max_generation_attempts;

        for attempt in 1..=attempts {
            let new_link = NewLink {
                code: generate_code(self.settings.code_length),
                long_url: long_url.clone(),
            };

            let result = match timeout(
                self.settings.store_timeout,
                self.link_repository.create(new_link),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => return Err(self.store_timed_out()),
            };

            match result {
                Ok(link) => return Ok(link),
                Err(AppError::Conflict { .. }) => {
                    tracing::warn!(attempt, "Short code collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(attempts, "Short code space exhausted: every generated code collided");
        Err(AppError::GenerationExhausted { attempts })
    }

    /// Resolves a short code to its long URL and records a click.
    ///
    /// Cache failures are never surfaced: they are logged and the lookup
    /// falls through to the store.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] for unknown or malformed codes
    /// - [`AppError::StoreUnavailable`] if the store cannot answer in time
    pub async fn resolve(&self, code: &str) -> Result<String, AppError> {
        if !is_well_formed_code(code) {
            return Err(not_found(code));
        }

        let long_url = match self.cache_get(code).await {
            Some(url) => url,
            None => {
                let link = self.find_in_store(code).await?.ok_or_else(|| not_found(code))?;
                self.cache_put(code, &link.long_url).await;
                link.long_url
            }
        };

        self.publisher.publish(ClickEvent::new(code));

        Ok(long_url)
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Full short URL for `code`.
    pub fn short_url(&self, code: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), code)
    }

    async fn find_in_store(&self, code: &str) -> Result<Option<Link>, AppError> {
        match timeout(
            self.settings.store_timeout,
            self.link_repository.find_by_code(code),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(self.store_timed_out()),
        }
    }

    async fn cache_get(&self, code: &str) -> Option<String> {
        let backend = self.cache.backend();

        match timeout(self.settings.cache_timeout, self.cache.get_url(code)).await {
            Ok(Ok(Some(url))) => {
                metrics::record_cache_hit(backend);
                Some(url)
            }
            Ok(Ok(None)) => {
                metrics::record_cache_miss(backend);
                None
            }
            Ok(Err(e)) => {
                let e = AppError::CacheUnavailable(e.to_string());
                tracing::warn!(code, error = %e, "Cache lookup failed, falling back to store");
                None
            }
            Err(_) => {
                tracing::warn!(code, "Cache lookup timed out, falling back to store");
                None
            }
        }
    }

    async fn cache_put(&self, code: &str, long_url: &str) {
        let put = self
            .cache
            .set_url(code, long_url, Some(self.settings.cache_ttl));

        match timeout(self.settings.cache_timeout, put).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(code, error = %e, "Failed to cache link"),
            Err(_) => tracing::warn!(code, "Caching link timed out"),
        }
    }

    fn store_timed_out(&self) -> AppError {
        AppError::StoreUnavailable(format!(
            "store did not answer within {:?}",
            self.settings.store_timeout
        ))
    }
}

fn not_found(code: &str) -> AppError {
    AppError::not_found("Short link not found", json!({ "code": code }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::click_publisher;
    use crate::domain::repositories::MockLinkRepository;
    use crate::infrastructure::cache::{CacheError, MockCacheService, NullCache};
    use chrono::Utc;
    use mockall::predicate::eq;
    use tokio::sync::mpsc;

    fn settings() -> LinkSettings {
        LinkSettings {
            base_url: "https://s.example.com/".to_string(),
            code_length: 7,
            max_generation_attempts: 5,
            cache_ttl: 3600,
            store_timeout: Duration::from_millis(200),
            cache_timeout: Duration::from_millis(50),
        }
    }

    fn link(code: &str, url: &str) -> Link {
        Link::new(code.to_string(), url.to_string(), Utc::now())
    }

    fn service(
        repo: MockLinkRepository,
        cache: Arc<dyn CacheService>,
    ) -> (LinkService<MockLinkRepository>, mpsc::Receiver<ClickEvent>) {
        let (publisher, rx) = click_publisher::channel(16);
        (
            LinkService::new(Arc::new(repo), cache, publisher, settings()),
            rx,
        )
    }

    fn conflict() -> AppError {
        AppError::conflict("Unique constraint violation", json!({}))
    }

    #[tokio::test]
    async fn test_create_normalizes_url_and_primes_cache() {
        let mut repo = MockLinkRepository::new();
        repo.expect_create()
            .withf(|l| l.long_url == "https://example.com/path" && l.code.len() == 7)
            .times(1)
            .returning(|l| Ok(link(&l.code, &l.long_url)));

        let mut cache = MockCacheService::new();
        cache
            .expect_set_url()
            .withf(|_, url, ttl| url == "https://example.com/path" && *ttl == Some(3600))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (service, _rx) = service(repo, Arc::new(cache));
        let created = service
            .create_short_link("https://EXAMPLE.COM:443/path#frag")
            .await
            .unwrap();

        assert_eq!(created.long_url, "https://example.com/path");
        assert!(created.code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_url_without_store_call() {
        let mut repo = MockLinkRepository::new();
        repo.expect_create().never();

        let (service, _rx) = service(repo, Arc::new(NullCache::new()));
        let err = service.create_short_link("ftp://example.com").await.unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_create_retries_on_collision() {
        let mut seq = mockall::Sequence::new();
        let mut repo = MockLinkRepository::new();
        repo.expect_create()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(conflict()));
        repo.expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|l| Ok(link(&l.code, &l.long_url)));

        let (service, _rx) = service(repo, Arc::new(NullCache::new()));

        assert!(service.create_short_link("https://example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_create_exhausts_after_max_attempts() {
        let mut repo = MockLinkRepository::new();
        repo.expect_create().times(5).returning(|_| Err(conflict()));

        let (service, _rx) = service(repo, Arc::new(NullCache::new()));
        let err = service.create_short_link("https://example.com").await.unwrap_err();

        assert!(matches!(err, AppError::GenerationExhausted { attempts: 5 }));
    }

    #[tokio::test]
    async fn test_create_ignores_cache_failure() {
        let mut repo = MockLinkRepository::new();
        repo.expect_create()
            .returning(|l| Ok(link(&l.code, &l.long_url)));

        let mut cache = MockCacheService::new();
        cache
            .expect_set_url()
            .returning(|_, _, _| Err(CacheError::ConnectionError("down".into())));

        let (service, _rx) = service(repo, Arc::new(cache));

        assert!(service.create_short_link("https://example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_cache_hit_skips_store() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().never();

        let mut cache = MockCacheService::new();
        cache.expect_backend().return_const("mock");
        cache
            .expect_get_url()
            .with(eq("Ab12Cd"))
            .times(1)
            .returning(|_| Ok(Some("https://example.com/".to_string())));

        let (service, mut rx) = service(repo, Arc::new(cache));

        assert_eq!(service.resolve("Ab12Cd").await.unwrap(), "https://example.com/");
        assert_eq!(rx.try_recv().unwrap().code, "Ab12Cd");
    }

    #[tokio::test]
    async fn test_resolve_cache_miss_reads_store_and_populates_cache() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code()
            .with(eq("Ab12Cd"))
            .times(1)
            .returning(|c| Ok(Some(link(c, "https://example.com/"))));

        let mut cache = MockCacheService::new();
        cache.expect_backend().return_const("mock");
        cache.expect_get_url().returning(|_| Ok(None));
        cache
            .expect_set_url()
            .withf(|code, url, _| code == "Ab12Cd" && url == "https://example.com/")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (service, _rx) = service(repo, Arc::new(cache));

        assert_eq!(service.resolve("Ab12Cd").await.unwrap(), "https://example.com/");
    }

    #[tokio::test]
    async fn test_resolve_cache_error_falls_back_to_store() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code()
            .times(1)
            .returning(|c| Ok(Some(link(c, "https://example.com/"))));

        let mut cache = MockCacheService::new();
        cache.expect_backend().return_const("mock");
        cache
            .expect_get_url()
            .returning(|_| Err(CacheError::ConnectionError("down".into())));
        cache
            .expect_set_url()
            .returning(|_, _, _| Err(CacheError::ConnectionError("down".into())));

        let (service, _rx) = service(repo, Arc::new(cache));

        assert_eq!(service.resolve("Ab12Cd").await.unwrap(), "https://example.com/");
    }

    #[tokio::test]
    async fn test_resolve_unknown_code_is_not_found_without_click() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().returning(|_| Ok(None));

        let (service, mut rx) = service(repo, Arc::new(NullCache::new()));
        let err = service.resolve("Zz99Zz").await.unwrap_err();

        assert!(matches!(err, AppError::NotFound { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resolve_malformed_code_touches_nothing() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().never();
        let mut cache = MockCacheService::new();
        cache.expect_get_url().never();

        let (service, _rx) = service(repo, Arc::new(cache));
        let too_long = "a".repeat(65);

        for code in ["", "bad-code", too_long.as_str()] {
            assert!(matches!(
                service.resolve(code).await,
                Err(AppError::NotFound { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_resolve_store_outage_is_unavailable_not_missing() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code()
            .returning(|_| Err(AppError::StoreUnavailable("down".into())));

        let (service, mut rx) = service(repo, Arc::new(NullCache::new()));
        let err = service.resolve("Ab12Cd").await.unwrap_err();

        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resolve_succeeds_when_click_queue_is_closed() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code()
            .returning(|c| Ok(Some(link(c, "https://example.com/"))));

        let (service, rx) = service(repo, Arc::new(NullCache::new()));
        drop(rx);

        assert!(service.resolve("Ab12Cd").await.is_ok());
    }

    #[test]
    fn test_short_url_joins_base_and_code() {
        let (service, _rx) = service(MockLinkRepository::new(), Arc::new(NullCache::new()));
        assert_eq!(service.short_url("Ab12Cd"), "https://s.example.com/Ab12Cd");
    }
}
