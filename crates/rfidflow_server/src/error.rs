//! HTTP error responses.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rfidflow_db::DbError;
use rfidflow_protocol::defaults::RETRY_AFTER_SECS;
use rfidflow_protocol::ErrorResponse;

/// An error rendered as `{"success": false, "error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Rewrite the message of a 500, leaving client errors alone.
    pub fn map_internal(self, f: impl FnOnce(String) -> String) -> Self {
        if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            Self::internal(f(self.message))
        } else {
            self
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        let status = match &err {
            DbError::Validation(_) => StatusCode::BAD_REQUEST,
            DbError::NotFound(_) => StatusCode::NOT_FOUND,
            DbError::Constraint(_) | DbError::InvalidState(_) => StatusCode::CONFLICT,
            e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "request failed");
        }
        let message = match err {
            DbError::Validation(msg)
            | DbError::NotFound(msg)
            | DbError::Constraint(msg)
            | DbError::InvalidState(msg) => msg,
            other => other.to_string(),
        };
        Self::new(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut resp = (self.status, Json(ErrorResponse::new(self.message))).into_response();
        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            resp.headers_mut()
                .insert("retry-after", HeaderValue::from(RETRY_AFTER_SECS));
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_db_error_status_mapping() {
        let cases = [
            (DbError::validation("empty tag"), StatusCode::BAD_REQUEST),
            (DbError::not_found("asset 9"), StatusCode::NOT_FOUND),
            (DbError::constraint("duplicate tag"), StatusCode::CONFLICT),
            (DbError::invalid_state("asset is deleted"), StatusCode::CONFLICT),
            (
                DbError::LockTimeout {
                    asset_id: 1,
                    waited: Duration::from_secs(5),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_domain_message_is_not_prefixed() {
        let err = ApiError::from(DbError::invalid_state("asset 3 is deleted"));
        assert_eq!(err.message, "asset 3 is deleted");
    }

    #[test]
    fn test_lock_timeout_sets_retry_after() {
        let resp = ApiError::from(DbError::LockTimeout {
            asset_id: 1,
            waited: Duration::from_millis(10),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()["retry-after"], "1");
    }

    #[test]
    fn test_map_internal_only_touches_500() {
        let err = ApiError::internal("boom").map_internal(|m| format!("wrapped: {}", m));
        assert_eq!(err.message, "wrapped: boom");

        let err = ApiError::bad_request("bad").map_internal(|m| format!("wrapped: {}", m));
        assert_eq!(err.message, "bad");
    }
}
