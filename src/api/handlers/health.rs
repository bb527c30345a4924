//! Handler for health check endpoint.

use axum::{Json, extract::State, http::StatusCode};
use tokio::time::timeout;

use crate::api::dto::health::{CheckStatus, HealthChecks, HealthResponse};
use crate::state::AppState;

/// Returns service health status with component checks.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response Codes
///
/// - **200 OK**: All components healthy
/// - **503 Service Unavailable**: One or more components degraded
///
/// # Components Checked
///
/// Every check is bounded by the store or cache timeout, so a hung backend
/// reports as an error instead of stalling the endpoint.
///
/// 1. **Database**: `SELECT 1` round trip
/// 2. **Cache**: backend ping (a disabled cache is always ok)
/// 3. **Broker**: backend ping
/// 4. **Click Queue**: publisher relay running, free buffer slots
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "checks": {
///     "database": { "status": "ok", "message": "Connected" },
///     "cache": { "status": "ok", "message": "redis connected" },
///     "broker": { "status": "ok", "message": "redis-streams connected" },
///     "click_queue": { "status": "ok", "message": "Capacity: 10000/10000" }
///   }
/// }
/// ```
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let (database, cache, broker) = tokio::join!(
        check_database(&state),
        check_cache(&state),
        check_broker(&state)
    );
    let click_queue = check_click_queue(&state);

    let all_healthy = database.is_ok() && cache.is_ok() && broker.is_ok() && click_queue.is_ok();

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database,
            cache,
            broker,
            click_queue,
        },
    };

    if all_healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn check_database(state: &AppState) -> CheckStatus {
    let limit = state.link_service.settings().store_timeout;
    match timeout(limit, state.links.ping()).await {
        Ok(Ok(())) => CheckStatus::ok("Connected"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Database health check failed");
            CheckStatus::error("Database unreachable")
        }
        Err(_) => {
            tracing::warn!(timeout = ?limit, "Database health check timed out");
            CheckStatus::error(format!("Database did not answer within {:?}", limit))
        }
    }
}

async fn check_cache(state: &AppState) -> CheckStatus {
    let backend = state.cache.backend();
    let limit = state.link_service.settings().cache_timeout;
    match timeout(limit, state.cache.health_check()).await {
        Ok(true) => CheckStatus::ok(format!("{} connected", backend)),
        Ok(false) => CheckStatus::error(format!("{} connection failed", backend)),
        Err(_) => CheckStatus::error(format!("{} did not answer within {:?}", backend, limit)),
    }
}

async fn check_broker(state: &AppState) -> CheckStatus {
    let backend = state.broker.backend();
    let limit = state.link_service.settings().store_timeout;
    match timeout(limit, state.broker.health_check()).await {
        Ok(true) => CheckStatus::ok(format!("{} connected", backend)),
        Ok(false) => CheckStatus::error(format!("{} connection failed", backend)),
        Err(_) => CheckStatus::error(format!("{} did not answer within {:?}", backend, limit)),
    }
}

/// Checks that the publisher relay is still draining the click buffer.
fn check_click_queue(state: &AppState) -> CheckStatus {
    let publisher = &state.click_publisher;
    if publisher.is_closed() {
        CheckStatus::error("Click queue is closed")
    } else {
        CheckStatus::ok(format!(
            "Capacity: {}/{}",
            publisher.capacity(),
            publisher.max_capacity()
        ))
    }
}
