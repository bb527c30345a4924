//! In-process repositories.
//!
//! Back the service when running without PostgreSQL in tests and local
//! experiments. They honor the same contracts as the PostgreSQL repositories:
//! duplicate codes conflict and duplicate idempotency keys collapse.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::entities::{Click, Link, NewClick, NewLink, RecordOutcome};
use crate::domain::repositories::{ClickRepository, LinkRepository};
use crate::error::AppError;

fn unavailable() -> AppError {
    AppError::StoreUnavailable("in-memory store marked unavailable".to_string())
}

/// Link storage keyed by code.
#[derive(Default)]
pub struct MemoryLinkRepository {
    links: RwLock<HashMap<String, Link>>,
    lookups: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_by_code` calls served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Simulates an outage: while unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LinkRepository for MemoryLinkRepository {
    async fn create(&self, new_link: NewLink) -> Result<Link, AppError> {
        self.ensure_available()?;

        let mut links = self.links.write().await;
        if links.contains_key(&new_link.code) {
            return Err(AppError::conflict(
                "Unique constraint violation",
                json!({ "constraint": "short_links_pkey" }),
            ));
        }

        let link = Link::new(new_link.code.clone(), new_link.long_url, Utc::now());
        links.insert(new_link.code, link.clone());
        Ok(link)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Link>, AppError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        Ok(self.links.read().await.get(code).cloned())
    }

    async fn count(&self) -> Result<i64, AppError> {
        self.ensure_available()?;
        Ok(self.links.read().await.len() as i64)
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.ensure_available()
    }
}

#[derive(Default)]
struct ClickTable {
    rows: Vec<Click>,
    keys: HashSet<String>,
}

/// Append-only click storage with a unique idempotency key.
#[derive(Default)]
pub struct MemoryClickRepository {
    table: RwLock<ClickTable>,
    unavailable: AtomicBool,
}

impl MemoryClickRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: while unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Snapshot of all recorded clicks in insertion order.
    pub async fn clicks(&self) -> Vec<Click> {
        self.table.read().await.rows.clone()
    }

    fn ensure_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClickRepository for MemoryClickRepository {
    async fn record_click(&self, new_click: NewClick) -> Result<RecordOutcome, AppError> {
        self.ensure_available()?;

        let mut table = self.table.write().await;
        if !table.keys.insert(new_click.idempotency_key.clone()) {
            return Ok(RecordOutcome::Duplicate);
        }

        let click = Click {
            id: table.rows.len() as i64 + 1,
            code: new_click.code,
            clicked_at: new_click.clicked_at,
            idempotency_key: new_click.idempotency_key,
            recorded_at: Utc::now(),
        };
        table.rows.push(click.clone());

        Ok(RecordOutcome::Inserted(click))
    }

    async fn count_clicks(
        &self,
        code: Option<String>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<i64, AppError> {
        self.ensure_available()?;

        let count = self
            .table
            .read()
            .await
            .rows
            .iter()
            .filter(|c| code.as_deref().is_none_or(|code| c.code == code))
            .filter(|c| from.is_none_or(|from| c.clicked_at >= from))
            .filter(|c| to.is_none_or(|to| c.clicked_at < to))
            .count();

        Ok(count as i64)
    }
}
