//! Shared-token check for `/api` routes.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rfidflow_protocol::http_types::ERR_UNAUTHORIZED;
use secstr::SecStr;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Token presented as `Authorization: Bearer <token>` or `X-Api-Key: <token>`.
pub fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        });
    bearer
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        })
        .filter(|t| !t.is_empty())
}

pub async fn require_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.ingest_token.as_deref() else {
        return next.run(req).await;
    };
    let accepted = presented_token(req.headers())
        .map(|t| SecStr::from(t) == *expected)
        .unwrap_or(false);
    if !accepted {
        warn!(path = %req.uri().path(), "rejected request without a valid token");
        return ApiError::unauthorized(ERR_UNAUTHORIZED).into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_and_api_key() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_token(&headers), None);

        headers.insert("x-api-key", HeaderValue::from_static(" k1 "));
        assert_eq!(presented_token(&headers), Some("k1"));

        headers.insert("authorization", HeaderValue::from_static("bearer k2"));
        assert_eq!(presented_token(&headers), Some("k2"));
    }

    #[test]
    fn test_other_schemes_fall_back_to_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(presented_token(&headers), None);
        headers.insert("x-api-key", HeaderValue::from_static("k"));
        assert_eq!(presented_token(&headers), Some("k"));
    }
}
