//! PostgreSQL implementation of click repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::entities::{Click, NewClick, RecordOutcome};
use crate::domain::repositories::ClickRepository;
use crate::error::AppError;

type ClickRow = (i64, String, DateTime<Utc>, String, DateTime<Utc>);

/// PostgreSQL repository for click records.
///
/// De-duplication is enforced by the `clicks_idempotency_key_key` unique
/// constraint; `ON CONFLICT DO NOTHING` turns a repeated key into an empty
/// `RETURNING` set instead of an error.
pub struct PgClickRepository {
    pool: Arc<PgPool>,
}

impl PgClickRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClickRepository for PgClickRepository {
    async fn record_click(&self, new_click: NewClick) -> Result<RecordOutcome, AppError> {
        let row = sqlx::query_as::<_, ClickRow>(
            r#"
            INSERT INTO clicks (code, clicked_at, idempotency_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING id, code, clicked_at, idempotency_key, recorded_at
            "#,
        )
        .bind(&new_click.code)
        .bind(new_click.clicked_at)
        .bind(&new_click.idempotency_key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(match row {
            Some((id, code, clicked_at, idempotency_key, recorded_at)) => {
                RecordOutcome::Inserted(Click {
                    id,
                    code,
                    clicked_at,
                    idempotency_key,
                    recorded_at,
                })
            }
            None => RecordOutcome::Duplicate,
        })
    }

    async fn count_clicks(
        &self,
        code: Option<String>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM clicks
            WHERE ($1::text IS NULL OR code = $1)
              AND ($2::timestamptz IS NULL OR clicked_at >= $2)
              AND ($3::timestamptz IS NULL OR clicked_at < $3)
            "#,
        )
        .bind(code)
        .bind(from)
        .bind(to)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }
}
