use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use tracing::warn;

use crate::constants::{DEFAULT_UPLOAD_FILE_NAME, UPLOAD_FIELD_NAME};
use crate::error::AppError;
use crate::gateway::{ConversionResult, Upload};
use crate::state::AppState;
use crate::upload::{multipart_error, read_field_capped};

pub(crate) async fn convert(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ConversionResult>, AppError> {
    let mut multipart = multipart.map_err(|e| {
        warn!(error = %e, "request is not a multipart upload");
        AppError::MissingFile
    })?;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD_NAME) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_UPLOAD_FILE_NAME)
            .to_string();
        let bytes = read_field_capped(&mut field).await?;

        let result = state.gateway.convert(Upload { file_name, bytes }).await?;
        return Ok(Json(result));
    }

    Err(AppError::MissingFile)
}
