// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::error::ShipperError;
use crate::hostname::get_hostname;
use crate::http::batch_headers;

pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STORE_DIR: &str = "gelf-shipper";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration of a [`crate::agent::ShipperAgent`].
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// Collector URL every batch is POSTed to
    pub endpoint: Url,
    /// How often pending records are flushed
    pub batch_interval: Duration,
    /// Timeout of one POST, including connect
    pub request_timeout: Duration,
    /// `host` written into every record
    pub host: String,
    /// Upper bound on records per POST; `None` sends everything pending
    pub max_batch_entries: Option<usize>,
    /// Extra headers added to every POST (e.g. authorization)
    pub headers: Vec<(String, String)>,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Directory holding the durable queue when the file store is used
    pub store_dir: PathBuf,
    /// Log level for binaries embedding the shipper (trace, debug, info, warn, error)
    pub log_level: String,
}

impl ShipperConfig {
    /// Defaults for everything but the endpoint.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            host: get_hostname(),
            max_batch_entries: None,
            headers: Vec::new(),
            https_proxy: None,
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    #[must_use]
    pub fn with_batch_interval(mut self, batch_interval: Duration) -> Self {
        self.batch_interval = batch_interval;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ShipperError> {
        let endpoint = env::var("GELF_ENDPOINT").map_err(|_| {
            ShipperError::InvalidConfig("GELF_ENDPOINT environment variable is not set".to_string())
        })?;
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            ShipperError::InvalidConfig(format!("GELF_ENDPOINT '{endpoint}' is not a URL: {e}"))
        })?;

        let mut config = Self::new(endpoint);

        if let Some(secs) = env_u64("GELF_BATCH_INTERVAL_SECS") {
            config.batch_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("GELF_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(host) = env::var("GELF_HOST") {
            if !host.is_empty() {
                config.host = host;
            }
        }
        config.max_batch_entries = env::var("GELF_MAX_BATCH_ENTRIES")
            .ok()
            .and_then(|val| val.parse::<usize>().ok());
        if let Ok(headers) = env::var("GELF_HEADERS") {
            config.headers = parse_headers(&headers)?;
        }
        config.https_proxy = env::var("GELF_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        if let Ok(dir) = env::var("GELF_STORE_DIR") {
            config.store_dir = PathBuf::from(dir);
        }
        if let Ok(level) = env::var("GELF_LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ShipperError> {
        if !matches!(self.endpoint.scheme(), "http" | "https") {
            return Err(ShipperError::InvalidConfig(format!(
                "endpoint must use http or https, got '{}'",
                self.endpoint.scheme()
            )));
        }

        if self.batch_interval.is_zero() {
            return Err(ShipperError::InvalidConfig(
                "batch interval must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ShipperError::InvalidConfig(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        if self.host.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "host cannot be empty".to_string(),
            ));
        }

        if self.max_batch_entries == Some(0) {
            return Err(ShipperError::InvalidConfig(
                "max batch entries must be greater than 0".to_string(),
            ));
        }

        batch_headers(&self.headers)
            .map_err(|e| ShipperError::InvalidConfig(format!("invalid header: {e}")))?;

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ShipperError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|val| val.parse::<u64>().ok())
}

/// Parses `name=value` pairs separated by commas.
fn parse_headers(raw: &str) -> Result<Vec<(String, String)>, ShipperError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .ok_or_else(|| {
                    ShipperError::InvalidConfig(format!(
                        "GELF_HEADERS entry '{pair}' must look like name=value"
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 10] = [
        "GELF_ENDPOINT",
        "GELF_BATCH_INTERVAL_SECS",
        "GELF_REQUEST_TIMEOUT_SECS",
        "GELF_HOST",
        "GELF_MAX_BATCH_ENTRIES",
        "GELF_HEADERS",
        "GELF_PROXY_HTTPS",
        "HTTPS_PROXY",
        "GELF_STORE_DIR",
        "GELF_LOG_LEVEL",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            env::remove_var(name);
        }
    }

    fn endpoint() -> Url {
        Url::parse("http://127.0.0.1:12201/gelf").unwrap()
    }

    #[test]
    fn test_new_defaults() {
        let config = ShipperConfig::new(endpoint());
        assert_eq!(config.batch_interval, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_batch_entries, None);
        assert!(config.headers.is_empty());
        assert!(!config.host.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ShipperConfig::new(Url::parse("ftp://example.com/").unwrap());
        assert!(config.validate().is_err());

        let config = ShipperConfig::new(endpoint()).with_batch_interval(Duration::ZERO);
        assert!(config.validate().is_err());

        let mut config = ShipperConfig::new(endpoint());
        config.max_batch_entries = Some(0);
        assert!(config.validate().is_err());

        let config = ShipperConfig::new(endpoint()).with_host("  ");
        assert!(config.validate().is_err());

        let mut config = ShipperConfig::new(endpoint());
        config.log_level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log level 'verbose'"));
    }

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers("Authorization=Bearer abc, X-Team = logs").unwrap();
        assert_eq!(
            headers,
            vec![
                ("Authorization".to_string(), "Bearer abc".to_string()),
                ("X-Team".to_string(), "logs".to_string()),
            ]
        );
        assert!(parse_headers("missing-separator").is_err());
        assert!(parse_headers("").unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn test_from_env_requires_endpoint() {
        clear_env();
        let err = ShipperConfig::from_env().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: GELF_ENDPOINT environment variable is not set"
        );
    }

    #[test]
    #[serial]
    fn test_from_env_reads_all_settings() {
        clear_env();
        env::set_var("GELF_ENDPOINT", "https://graylog.example.com/gelf");
        env::set_var("GELF_BATCH_INTERVAL_SECS", "15");
        env::set_var("GELF_REQUEST_TIMEOUT_SECS", "2");
        env::set_var("GELF_HOST", "api-7");
        env::set_var("GELF_MAX_BATCH_ENTRIES", "500");
        env::set_var("GELF_HEADERS", "Authorization=Basic Zm9v");
        env::set_var("HTTPS_PROXY", "http://proxy.local:3128");
        env::set_var("GELF_STORE_DIR", "/var/lib/gelf");
        env::set_var("GELF_LOG_LEVEL", "DEBUG");

        let config = ShipperConfig::from_env().unwrap();
        assert_eq!(config.endpoint.as_str(), "https://graylog.example.com/gelf");
        assert_eq!(config.batch_interval, Duration::from_secs(15));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.host, "api-7");
        assert_eq!(config.max_batch_entries, Some(500));
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.https_proxy.as_deref(), Some("http://proxy.local:3128"));
        assert_eq!(config.store_dir, PathBuf::from("/var/lib/gelf"));
        assert_eq!(config.log_level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_endpoint() {
        clear_env();
        env::set_var("GELF_ENDPOINT", "not a url");
        assert!(ShipperConfig::from_env().is_err());

        env::set_var("GELF_ENDPOINT", "http://graylog.example.com/gelf");
        env::set_var("GELF_BATCH_INTERVAL_SECS", "0");
        assert!(ShipperConfig::from_env().is_err());

        clear_env();
    }
}
