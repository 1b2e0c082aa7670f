use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::constants::MAX_FILE_BYTES;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("File size exceeds maximum limit of {}MB", .max_bytes / 1024 / 1024)]
    PayloadTooLarge { max_bytes: usize },
    #[error("Unsupported file type: {0}")]
    UnsupportedMediaType(String),
    #[error("Invalid or missing API key")]
    Unauthorized,
    #[error("Rate limit exceeded. Maximum {limit} requests per minute.")]
    RateLimitExceeded { limit: u32, retry_after: Duration },
    #[error("Error during document conversion: {0}")]
    ConversionFailed(String),
    #[error("No file uploaded: expected a multipart field named 'file'")]
    MissingFile,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub(crate) fn payload_too_large() -> Self {
        AppError::PayloadTooLarge {
            max_bytes: MAX_FILE_BYTES,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ConversionFailed(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            AppError::Internal(msg) => {
                error!("{msg}");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let mut res = (status, Json(ErrorBody { detail })).into_response();
        if let AppError::RateLimitExceeded { retry_after, .. } = self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                res.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        res
    }
}
