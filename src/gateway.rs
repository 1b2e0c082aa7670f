//! Upload-to-Markdown round trip.
//!
//! Order is fixed: size check, persist to a scoped temp file, sniff and
//! allow-list, convert, render. The temp file is a [`NamedTempFile`] owned by
//! the call, so it is removed on every exit path, including the future being
//! dropped mid-conversion.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::convert::{render_markdown, Converter};
use crate::error::AppError;
use crate::upload::{detect_file_type, validate_size, validate_type};

/// A fully buffered upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionMetadata {
    pub original_file: String,
    pub mime_type: String,
    pub file_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub content: String,
    pub metadata: ConversionMetadata,
}

pub struct ConversionGateway {
    converter: Arc<dyn Converter>,
    upload_dir: PathBuf,
}

impl ConversionGateway {
    pub fn new(converter: Arc<dyn Converter>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            converter,
            upload_dir: upload_dir.into(),
        }
    }

    pub async fn convert(&self, upload: Upload) -> Result<ConversionResult, AppError> {
        let file_size = upload.bytes.len();
        validate_size(file_size)?;

        let scratch = self.persist(&upload.bytes).await?;

        let mime_type = detect_file_type(scratch.path()).await?;
        let format = validate_type(&mime_type)?;

        let document = self
            .converter
            .convert(scratch.path(), format)
            .await
            .map_err(|e| {
                error!(
                    converter = self.converter.name(),
                    file = %upload.file_name,
                    %mime_type,
                    error = %e,
                    "conversion failed"
                );
                AppError::ConversionFailed(e.to_string())
            })?;
        let content = render_markdown(format, &document);

        info!(
            converter = self.converter.name(),
            file = %upload.file_name,
            %mime_type,
            file_size,
            markdown_len = content.len(),
            "converted document"
        );

        Ok(ConversionResult {
            content,
            metadata: ConversionMetadata {
                original_file: upload.file_name,
                mime_type,
                file_size,
            },
        })
    }

    async fn persist(&self, bytes: &[u8]) -> Result<NamedTempFile, AppError> {
        let scratch = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&self.upload_dir)
            .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;
        // Write through an open handle, never by path: a write that outlives a
        // cancelled request must not recreate the unlinked file.
        let handle = scratch
            .reopen()
            .map_err(|e| AppError::Internal(format!("Failed to open temp file: {e}")))?;
        let mut file = tokio::fs::File::from_std(handle);
        file.write_all(bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write upload: {e}")))?;
        file.flush()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write upload: {e}")))?;
        Ok(scratch)
    }
}
