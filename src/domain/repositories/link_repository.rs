//! Repository trait for short link data access.

use crate::domain::entities::{Link, NewLink};
use crate::error::AppError;
use async_trait::async_trait;

/// Repository interface for short links. This is the source of truth that the
/// cache projects.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgLinkRepository`] - PostgreSQL implementation
/// - [`crate::infrastructure::persistence::MemoryLinkRepository`] - In-process implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Inserts a new short link.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] if the code already exists. Callers treat
    /// this as a generation collision.
    ///
    /// Returns [`AppError::StoreUnavailable`] when the store cannot be reached.
    async fn create(&self, new_link: NewLink) -> Result<Link, AppError>;

    /// Finds a link by its short code.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::StoreUnavailable`] when the store cannot be reached.
    async fn find_by_code(&self, code: &str) -> Result<Option<Link>, AppError>;

    /// Counts all stored links.
    async fn count(&self) -> Result<i64, AppError>;

    /// Cheap connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<(), AppError>;
}
