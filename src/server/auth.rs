/// Bearer-token authentication for the API
///
/// Only enforced when `API_TOKEN` is configured.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use super::handlers::{ApiError, AppState};

/// Token from `Authorization: Bearer TOKEN`, or a bare `Authorization: TOKEN`
fn provided_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

pub async fn require_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.settings.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    match provided_token(&headers) {
        Some(provided) if provided == expected => Ok(next.run(request).await),
        _ => {
            tracing::debug!("Rejected request to {}: bad or missing token", request.uri().path());
            Err(ApiError::unauthorized())
        }
    }
}
