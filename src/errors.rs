use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Service-wide error type. Domain components return these; the HTTP
/// boundary maps each variant to a status code and a stable
/// `{error, message}` body.
#[derive(Debug, Error)]
pub enum KiteError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("no drivers available in your area")]
    NoDriversAvailable,

    #[error("this ride has been assigned to another driver")]
    RideAlreadyAssigned,

    #[error("this ride offer has expired")]
    OfferExpired,

    #[error("cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("an active ride already exists")]
    ActiveRideExists,

    #[error("idempotency key already used with different request")]
    IdempotencyConflict,

    #[error("a request with this idempotency key is already being processed")]
    RequestInProgress,

    #[error("wallet balance insufficient")]
    InsufficientFunds,

    #[error("too many requests, please try again later")]
    RateLimitExceeded,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl KiteError {
    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            KiteError::NotFound(_) => "not_found",
            KiteError::BadRequest(_) => "bad_request",
            KiteError::Conflict(_) => "conflict",
            KiteError::Unauthorized(_) => "unauthorized",
            KiteError::NoDriversAvailable => "no_drivers_available",
            KiteError::RideAlreadyAssigned => "ride_already_assigned",
            KiteError::OfferExpired => "offer_expired",
            KiteError::InvalidTransition { .. } => "invalid_transition",
            KiteError::ActiveRideExists => "active_ride_exists",
            KiteError::IdempotencyConflict => "idempotency_conflict",
            KiteError::RequestInProgress => "request_in_progress",
            KiteError::InsufficientFunds => "insufficient_funds",
            KiteError::RateLimitExceeded => "rate_limit_exceeded",
            KiteError::Validation(_) => "bad_request",
            KiteError::Database(_) | KiteError::Cache(_) | KiteError::Internal(_) => {
                "internal_error"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            KiteError::NotFound(_) => StatusCode::NOT_FOUND,
            KiteError::BadRequest(_) | KiteError::Validation(_) => StatusCode::BAD_REQUEST,
            KiteError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            KiteError::Conflict(_)
            | KiteError::RideAlreadyAssigned
            | KiteError::ActiveRideExists
            | KiteError::IdempotencyConflict
            | KiteError::RequestInProgress => StatusCode::CONFLICT,
            KiteError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            KiteError::NoDriversAvailable => StatusCode::SERVICE_UNAVAILABLE,
            KiteError::OfferExpired => StatusCode::GONE,
            KiteError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            KiteError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            KiteError::Database(_) | KiteError::Cache(_) | KiteError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    // Helper constructors, mirroring how call sites read.

    pub fn not_found(resource: impl Into<String>) -> Self {
        KiteError::NotFound(resource.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        KiteError::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        KiteError::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        KiteError::Unauthorized(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        KiteError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl IntoResponse for KiteError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Never leak store internals to clients.
        let message = match &self {
            KiteError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "internal server error".to_string()
            }
            KiteError::Cache(e) => {
                tracing::error!(error = %e, "cache error");
                "internal server error".to_string()
            }
            KiteError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for KiteError {
    fn from(err: validator::ValidationErrors) -> Self {
        KiteError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for KiteError {
    fn from(err: serde_json::Error) -> Self {
        KiteError::Internal(format!("serialization error: {err}"))
    }
}

/// Convenience alias used throughout the crate.
pub type KiteResult<T> = Result<T, KiteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = KiteError::not_found("ride");
        assert_eq!(err.to_string(), "ride not found");

        let err = KiteError::invalid_transition("completed", "matching");
        assert_eq!(
            err.to_string(),
            "cannot transition from completed to matching"
        );
    }

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(KiteError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(KiteError::OfferExpired.status(), StatusCode::GONE);
        assert_eq!(
            KiteError::NoDriversAvailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            KiteError::RideAlreadyAssigned.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            KiteError::InsufficientFunds.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            KiteError::RateLimitExceeded.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            KiteError::invalid_transition("a", "b").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            KiteError::IdempotencyConflict.code(),
            "idempotency_conflict"
        );
        assert_eq!(KiteError::RequestInProgress.code(), "request_in_progress");
        assert_eq!(KiteError::ActiveRideExists.code(), "active_ride_exists");
    }
}
