//! Application error type and its HTTP mapping.
//!
//! [`AppError`] is shared by repositories, services, and handlers. Transient
//! backend failures (`StoreUnavailable`, `CacheUnavailable`, `BrokerUnavailable`)
//! are kept distinct from `NotFound` so clients can tell "doesn't exist" apart
//! from "temporarily can't tell".

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

/// Serializable error payload returned to API clients.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
    pub details: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed client input.
    #[error("{message}")]
    Validation { message: String, details: Value },

    #[error("{message}")]
    NotFound { message: String, details: Value },

    /// A uniqueness constraint was violated.
    #[error("{message}")]
    Conflict { message: String, details: Value },

    /// Every generated code collided. Operationally fatal.
    #[error("Failed to generate a unique short code after {attempts} attempts")]
    GenerationExhausted { attempts: usize },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("{message}")]
    Internal { message: String, details: Value },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }

    pub fn conflict(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }

    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }

    /// Returns true for failures that may succeed when retried later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::CacheUnavailable(_) | Self::BrokerUnavailable(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::StoreUnavailable(_) | Self::CacheUnavailable(_) | Self::BrokerUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::GenerationExhausted { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::GenerationExhausted { .. } => "generation_exhausted",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::CacheUnavailable(_) => "cache_unavailable",
            Self::BrokerUnavailable(_) => "broker_unavailable",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Builds the client-facing error payload.
    ///
    /// Backend error messages are replaced by a generic text so connection
    /// details never leak to clients.
    pub fn to_error_info(&self) -> ErrorInfo {
        let (message, details) = match self {
            Self::Validation { message, details }
            | Self::NotFound { message, details }
            | Self::Conflict { message, details }
            | Self::Internal { message, details } => (message.clone(), details.clone()),
            Self::GenerationExhausted { attempts } => {
                (self.to_string(), json!({ "attempts": attempts }))
            }
            Self::StoreUnavailable(_) | Self::CacheUnavailable(_) | Self::BrokerUnavailable(_) => (
                "Service temporarily unavailable, please retry".to_string(),
                json!({}),
            ),
        };

        ErrorInfo {
            code: self.error_code(),
            message,
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = ErrorBody {
            error: self.to_error_info(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        map_sqlx_error(e)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        let details = serde_json::to_value(e.field_errors()).unwrap_or_else(|_| json!({}));
        AppError::bad_request("Request validation failed", details)
    }
}

/// Maps SQLx errors onto the application taxonomy.
///
/// - unique violations become [`AppError::Conflict`] carrying the constraint name
/// - connectivity problems become [`AppError::StoreUnavailable`]
/// - everything else is [`AppError::Internal`]
pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    if let Some(db) = e.as_database_error()
        && db.is_unique_violation()
    {
        return AppError::conflict(
            "Unique constraint violation",
            json!({ "constraint": db.constraint() }),
        );
    }

    match e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => AppError::StoreUnavailable(e.to_string()),
        other => {
            tracing::error!("Database error: {}", other);
            AppError::internal("Database error", json!({}))
        }
    }
}
