use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_API_PREFIX, DEFAULT_APP_NAME, DEFAULT_BIND_ADDR, DEFAULT_CONVERT_TIMEOUT,
    DEFAULT_DOCLING_BIN, DEFAULT_RATE_LIMIT_PER_MINUTE,
};

const ENV_PREFIX: &str = "MARKDOWN_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: String, value: String },
    #[error("MARKDOWN_REQUIRE_API_KEY is set but MARKDOWN_API_KEY is empty")]
    MissingApiKey,
}

/// Process-wide access settings. Read-only once the server starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub api_key: Option<String>,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub rate_limit_per_minute: u32,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            api_key: None,
            allowed_origins: Vec::new(),
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub docling_bin: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub version: String,
    pub api_prefix: String,
    pub upload_dir: PathBuf,
    pub bind: String,
    pub trust_proxy_headers: bool,
    pub access: AccessPolicy,
    pub converter: ConverterConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from `lookup`, which receives full variable names
    /// (`MARKDOWN_API_KEY`, `BIND_ADDR`, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var("API_KEY");
        let require_api_key = var("REQUIRE_API_KEY")
            .map(|v| parse_bool_loose(&v))
            .unwrap_or(false);
        if require_api_key && api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }

        let rate_limit_per_minute = match var("RATE_LIMIT_PER_MINUTE") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => return Err(invalid("RATE_LIMIT_PER_MINUTE", raw)),
            },
            None => DEFAULT_RATE_LIMIT_PER_MINUTE,
        };

        let timeout = match var("CONVERT_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(invalid("CONVERT_TIMEOUT_SECS", raw)),
            },
            None => DEFAULT_CONVERT_TIMEOUT,
        };

        Ok(Self {
            app_name: var("APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            version: var("VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            api_prefix: normalize_prefix(
                &var("API_PREFIX").unwrap_or_else(|| DEFAULT_API_PREFIX.to_string()),
            ),
            upload_dir: var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("doc-to-markdown")),
            bind: lookup("BIND_ADDR")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            trust_proxy_headers: var("TRUST_PROXY_HEADERS")
                .map(|v| parse_bool_loose(&v))
                .unwrap_or(false),
            access: AccessPolicy {
                api_key,
                allowed_origins: var("ALLOWED_ORIGINS")
                    .map(|v| split_origins(&v))
                    .unwrap_or_default(),
                rate_limit_per_minute,
            },
            converter: ConverterConfig {
                docling_bin: var("DOCLING_BIN").unwrap_or_else(|| DEFAULT_DOCLING_BIN.to_string()),
                timeout,
            },
        })
    }
}

fn invalid(name: &str, value: String) -> ConfigError {
    ConfigError::Invalid {
        key: format!("{ENV_PREFIX}{name}"),
        value,
    }
}

pub(crate) fn parse_bool_loose(s: &str) -> bool {
    let v = s.trim().to_ascii_lowercase();
    matches!(v.as_str(), "1" | "true" | "on" | "yes")
}

/// `*` anywhere in the list collapses it to "any origin".
fn split_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();
    if origins.iter().any(|o| o == "*") {
        return Vec::new();
    }
    origins
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.app_name, "Doc-to-Markdown API");
        assert_eq!(cfg.api_prefix, "/api/v1");
        assert_eq!(cfg.bind, "0.0.0.0:8080");
        assert_eq!(cfg.access, AccessPolicy::default());
        assert_eq!(cfg.access.rate_limit_per_minute, 60);
        assert_eq!(cfg.converter.docling_bin, "docling");
        assert!(!cfg.trust_proxy_headers);
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let cfg = config_from(&[(
            "MARKDOWN_ALLOWED_ORIGINS",
            " https://a.example , ,https://b.example",
        )])
        .unwrap();
        assert_eq!(
            cfg.access.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );

        let any = config_from(&[("MARKDOWN_ALLOWED_ORIGINS", "https://a.example,*")]).unwrap();
        assert!(any.access.allowed_origins.is_empty());
    }

    #[test]
    fn empty_api_key_counts_as_unset() {
        let cfg = config_from(&[("MARKDOWN_API_KEY", "   ")]).unwrap();
        assert_eq!(cfg.access.api_key, None);
    }

    #[test]
    fn fail_closed_posture_requires_a_key() {
        let err = config_from(&[("MARKDOWN_REQUIRE_API_KEY", "yes")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));

        let cfg = config_from(&[
            ("MARKDOWN_REQUIRE_API_KEY", "true"),
            ("MARKDOWN_API_KEY", "s3cret"),
        ])
        .unwrap();
        assert_eq!(cfg.access.api_key.as_deref(), Some("s3cret"));
    }

    #[test]
    fn rate_limit_must_be_a_positive_integer() {
        assert!(config_from(&[("MARKDOWN_RATE_LIMIT_PER_MINUTE", "0")]).is_err());
        assert!(config_from(&[("MARKDOWN_RATE_LIMIT_PER_MINUTE", "lots")]).is_err());
        let cfg = config_from(&[("MARKDOWN_RATE_LIMIT_PER_MINUTE", "5")]).unwrap();
        assert_eq!(cfg.access.rate_limit_per_minute, 5);
    }

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix("api/v2/"), "/api/v2");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("/api"), "/api");
    }

    #[test]
    fn loose_bools() {
        for v in ["1", "true", "ON", " yes "] {
            assert!(parse_bool_loose(v), "{v}");
        }
        for v in ["0", "false", "nope", ""] {
            assert!(!parse_bool_loose(v), "{v}");
        }
    }
}
