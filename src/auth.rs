use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::constants::API_KEY_HEADER;
use crate::error::AppError;
use crate::state::AppState;

/// With no configured key every caller is admitted; otherwise the supplied
/// header value must match it exactly.
pub fn check_api_key(expected: Option<&str>, supplied: Option<&str>) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match supplied {
        Some(value) if value == expected => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

pub(crate) async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let supplied = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(err) = check_api_key(state.policy.api_key.as_deref(), supplied) {
        warn!(
            path = %request.uri().path(),
            key_present = supplied.is_some(),
            "rejected request with bad API key"
        );
        return Err(err);
    }
    Ok(next.run(request).await)
}
