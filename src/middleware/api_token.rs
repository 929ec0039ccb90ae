use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::error::{ApiError, msg};
use crate::util::extract_bearer_token;

/// Require `Authorization: Bearer <CLASSPAY_API_TOKEN>`.
///
/// With no token configured every request is rejected.
pub async fn api_token_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        tracing::warn!("API token not configured, rejecting request");
        return ApiError::Unauthenticated(msg::INVALID_API_TOKEN.into()).into_response();
    };

    let Some(token) = extract_bearer_token(request.headers()) else {
        return ApiError::Unauthenticated(msg::MISSING_AUTH_HEADER.into()).into_response();
    };

    if !bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
        return ApiError::Unauthenticated(msg::INVALID_API_TOKEN.into()).into_response();
    }

    next.run(request).await
}
