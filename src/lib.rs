//! HTTP service that converts uploaded documents (PDF, images, Word, HTML,
//! PowerPoint) to Markdown.
//!
//! Every upload passes the same gate before any conversion work happens:
//! per-client rate limiting, an optional shared-secret check, a size ceiling
//! and a content-sniffed MIME allow-list. Conversion itself is delegated to a
//! [`convert::Converter`] backend.

pub mod app;
pub mod auth;
pub mod config;
pub mod constants;
pub mod convert;
pub mod error;
pub mod gateway;
pub mod rate_limit;
pub mod shutdown;
pub mod sniff;
pub mod state;
pub mod upload;

mod handlers;

pub use app::build_router;
pub use config::{AccessPolicy, AppConfig, ConfigError};
pub use error::AppError;
pub use gateway::{ConversionGateway, ConversionMetadata, ConversionResult, Upload};
pub use state::AppState;
