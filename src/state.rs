use std::sync::Arc;

use crate::config::{AccessPolicy, AppConfig};
use crate::constants::RATE_LIMIT_WINDOW;
use crate::convert::{Converter, DoclingCli};
use crate::gateway::ConversionGateway;
use crate::rate_limit::SlidingWindowLimiter;

#[derive(Clone)]
pub struct AppState {
    pub(crate) policy: Arc<AccessPolicy>,
    pub(crate) limiter: Arc<SlidingWindowLimiter>,
    pub(crate) gateway: Arc<ConversionGateway>,
    pub(crate) trust_proxy_headers: bool,
}

impl AppState {
    /// Wires the docling backend. Creates the upload dir if needed.
    pub fn new(config: &AppConfig) -> std::io::Result<Self> {
        let converter = Arc::new(DoclingCli::new(&config.converter, &config.upload_dir));
        Self::with_converter(config, converter)
    }

    pub fn with_converter(
        config: &AppConfig,
        converter: Arc<dyn Converter>,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.upload_dir)?;
        Ok(Self {
            policy: Arc::new(config.access.clone()),
            limiter: Arc::new(SlidingWindowLimiter::new(
                config.access.rate_limit_per_minute,
                RATE_LIMIT_WINDOW,
            )),
            gateway: Arc::new(ConversionGateway::new(converter, &config.upload_dir)),
            trust_proxy_headers: config.trust_proxy_headers,
        })
    }
}
