//! Repository trait for persisted click records.

use crate::domain::entities::{NewClick, RecordOutcome};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only click storage used by the click consumer.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgClickRepository`] - PostgreSQL implementation
/// - [`crate::infrastructure::persistence::MemoryClickRepository`] - In-process implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClickRepository: Send + Sync {
    /// Records a click unless one with the same idempotency key exists.
    ///
    /// A repeated key is reported as [`RecordOutcome::Duplicate`], never as an error.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::StoreUnavailable`] or [`AppError::Internal`] when the
    /// write did not happen.
    async fn record_click(&self, new_click: NewClick) -> Result<RecordOutcome, AppError>;

    /// Counts clicks, optionally for a single code and time window.
    async fn count_clicks(
        &self,
        code: Option<String>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<i64, AppError>;
}
