//! PostgreSQL repository tests.
//!
//! `#[sqlx::test]` creates a fresh database per test from `DATABASE_URL` and
//! applies `migrations/`.

use chrono::{Duration, TimeZone, Utc};
use linktrail::domain::entities::{NewClick, NewLink, RecordOutcome};
use linktrail::domain::repositories::{ClickRepository, LinkRepository};
use linktrail::error::AppError;
use linktrail::infrastructure::persistence::{PgClickRepository, PgLinkRepository};
use sqlx::PgPool;
use std::sync::Arc;

fn new_link(code: &str) -> NewLink {
    NewLink {
        code: code.to_string(),
        long_url: "https://example.com/".to_string(),
    }
}

fn new_click(code: &str, key: &str, minutes: i64) -> NewClick {
    NewClick {
        code: code.to_string(),
        clicked_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
        idempotency_key: key.to_string(),
    }
}

#[sqlx::test]
async fn test_create_and_find_link(pool: PgPool) {
    let repo = PgLinkRepository::new(Arc::new(pool));

    let link = repo.create(new_link("pg0001")).await.unwrap();
    assert_eq!(link.code, "pg0001");
    assert_eq!(link.long_url, "https://example.com/");

    let found = repo.find_by_code("pg0001").await.unwrap().unwrap();
    assert_eq!(found.long_url, link.long_url);
    assert!(repo.find_by_code("missing").await.unwrap().is_none());
}

#[sqlx::test]
async fn test_duplicate_code_is_conflict(pool: PgPool) {
    let repo = PgLinkRepository::new(Arc::new(pool));

    repo.create(new_link("pg0002")).await.unwrap();
    let result = repo.create(new_link("pg0002")).await;

    assert!(matches!(result, Err(AppError::Conflict { .. })));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[sqlx::test]
async fn test_ping(pool: PgPool) {
    let repo = PgLinkRepository::new(Arc::new(pool));
    repo.ping().await.unwrap();
}

#[sqlx::test]
async fn test_record_click_is_idempotent(pool: PgPool) {
    let repo = PgClickRepository::new(Arc::new(pool));

    let first = repo.record_click(new_click("pg0003", "key-1", 0)).await.unwrap();
    let second = repo.record_click(new_click("pg0003", "key-1", 0)).await.unwrap();

    assert!(matches!(first, RecordOutcome::Inserted(_)));
    assert!(second.is_duplicate());
    assert_eq!(
        repo.count_clicks(Some("pg0003".into()), None, None).await.unwrap(),
        1
    );
}

#[sqlx::test]
async fn test_count_clicks_filters(pool: PgPool) {
    let repo = PgClickRepository::new(Arc::new(pool));

    for (i, code) in ["aaa111", "aaa111", "bbb222"].iter().enumerate() {
        repo.record_click(new_click(code, &format!("key-{}", i), i as i64 * 10))
            .await
            .unwrap();
    }

    let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    assert_eq!(repo.count_clicks(None, None, None).await.unwrap(), 3);
    assert_eq!(
        repo.count_clicks(Some("aaa111".into()), None, None).await.unwrap(),
        2
    );
    assert_eq!(
        repo.count_clicks(None, Some(start + Duration::minutes(5)), None)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        repo.count_clicks(None, None, Some(start + Duration::minutes(5)))
            .await
            .unwrap(),
        1
    );
}
