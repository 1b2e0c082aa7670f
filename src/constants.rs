use std::time::Duration;

pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
pub(crate) const MAX_BODY_BYTES: usize = (2 * MAX_FILE_BYTES) + (1024 * 1024);

pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
pub(crate) const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 60;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const HEALTH_PATH: &str = "/api/health";
pub(crate) const UPLOAD_FIELD_NAME: &str = "file";
pub(crate) const DEFAULT_UPLOAD_FILE_NAME: &str = "upload";

pub(crate) const DEFAULT_APP_NAME: &str = "Doc-to-Markdown API";
pub(crate) const DEFAULT_API_PREFIX: &str = "/api/v1";
pub(crate) const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub(crate) const DEFAULT_DOCLING_BIN: &str = "docling";
pub(crate) const DEFAULT_CONVERT_TIMEOUT: Duration = Duration::from_secs(300);
