//! Caller identity plumbing. Verifying who the caller is happens upstream; this
//! layer only turns the forwarded identity into a `UserId` request extension.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use shared::{domain::UserId, error::ApiError};

pub const CALLER_HEADER: &str = "x-user-id";

pub async fn require_caller(
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let caller = request
        .headers()
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(UserId::new)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiError::unauthorized("missing caller identity")),
            )
        })?;

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
