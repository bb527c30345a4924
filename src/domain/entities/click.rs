//! Click entity representing a single persisted redirect.

use chrono::{DateTime, Utc};

/// A click record as stored in the `clicks` table.
///
/// Append-only: the core never updates or deletes click rows.
#[derive(Debug, Clone)]
pub struct Click {
    pub id: i64,
    pub code: String,
    pub clicked_at: DateTime<Utc>,
    pub idempotency_key: String,
    pub recorded_at: DateTime<Utc>,
}

/// Input data for recording a click.
///
/// `idempotency_key` is unique at the store layer; recording the same key
/// twice leaves a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClick {
    pub code: String,
    pub clicked_at: DateTime<Utc>,
    pub idempotency_key: String,
}

/// Result of recording a click.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Inserted(Click),
    /// A row with the same idempotency key already exists.
    Duplicate,
}

impl RecordOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}
