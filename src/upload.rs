use std::path::Path;

use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};

use crate::constants::MAX_FILE_BYTES;
use crate::error::AppError;
use crate::sniff::{self, MIME_DOCX, MIME_MSWORD, MIME_PPTX, MIME_WEBP};

/// The converter pipeline a detected upload is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Pdf,
    Image,
    Docx,
    Html,
    Pptx,
}

impl InputFormat {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let format = match mime_type {
            "application/pdf" => InputFormat::Pdf,
            "image/jpeg" | "image/png" | "image/gif" => InputFormat::Image,
            m if m == MIME_WEBP => InputFormat::Image,
            m if m == MIME_MSWORD || m == MIME_DOCX => InputFormat::Docx,
            "text/html" => InputFormat::Html,
            m if m == MIME_PPTX => InputFormat::Pptx,
            _ => return None,
        };
        Some(format)
    }
}

pub fn validate_size(byte_length: usize) -> Result<(), AppError> {
    if byte_length > MAX_FILE_BYTES {
        return Err(AppError::payload_too_large());
    }
    Ok(())
}

pub fn validate_type(mime_type: &str) -> Result<InputFormat, AppError> {
    InputFormat::from_mime(mime_type)
        .ok_or_else(|| AppError::UnsupportedMediaType(mime_type.to_string()))
}

/// Sniffs the persisted upload. The file has already passed the size check,
/// so reading it whole is bounded.
pub async fn detect_file_type(path: &Path) -> Result<String, AppError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read upload {}: {e}", path.display())))?;
    Ok(sniff::sniff_mime(&bytes))
}

/// Buffers one multipart field, giving up as soon as it crosses the file
/// ceiling instead of draining the rest of the stream.
pub(crate) async fn read_field_capped(field: &mut Field<'_>) -> Result<Bytes, AppError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        buf.extend_from_slice(&chunk);
        validate_size(buf.len())?;
    }
    Ok(buf.freeze())
}

pub(crate) fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large()
    } else {
        AppError::BadRequest(e.body_text())
    }
}
