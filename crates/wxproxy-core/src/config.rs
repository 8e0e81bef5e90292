use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Default upstream provider base URL.
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// Optional settings file, looked up in the working directory (`wxproxy.toml`).
const SETTINGS_FILE: &str = "wxproxy";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Process settings, sourced from the environment.
///
/// Field names match the environment variable names lowercased, so
/// `WEATHER_API_KEY` populates `weather_api_key`. A `.env` file and an
/// optional `wxproxy.toml` are read first; the environment wins.
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Upstream provider base URL
    #[serde(default = "default_weather_base_url")]
    pub weather_base_url: Option<String>,

    /// Upstream provider API key, injected into every outgoing call
    #[serde(default)]
    pub weather_api_key: Option<String>,

    /// Upstream request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Cache store URL (`redis://...` or `memory://`); unset disables caching
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Cache entry lifetime in seconds; 0 disables caching
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// SQLite database path
    #[serde(default)]
    pub db_dsn: Option<String>,

    #[serde(default = "default_pool_min")]
    pub db_pool_min: u32,

    /// Maximum pooled connections; 0 means no pool (one connection per call)
    #[serde(default = "default_pool_max")]
    pub db_pool_max: u32,

    #[serde(default = "default_pool_increment")]
    pub db_pool_increment: u32,

    /// Seconds to wait for a pooled connection before failing
    #[serde(default = "default_pool_timeout")]
    pub db_pool_timeout: u64,

    /// Create the response table on start-up if it does not exist
    #[serde(default = "default_true")]
    pub db_init_schema: bool,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory for the rolling log file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_weather_base_url() -> Option<String> {
    Some(DEFAULT_WEATHER_BASE_URL.to_string())
}

fn default_request_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    30
}

fn default_pool_min() -> u32 {
    1
}

fn default_pool_max() -> u32 {
    4
}

fn default_pool_increment() -> u32 {
    1
}

fn default_pool_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            weather_base_url: default_weather_base_url(),
            weather_api_key: None,
            request_timeout: default_request_timeout(),
            redis_url: None,
            cache_ttl: default_cache_ttl(),
            db_dsn: None,
            db_pool_min: default_pool_min(),
            db_pool_max: default_pool_max(),
            db_pool_increment: default_pool_increment(),
            db_pool_timeout: default_pool_timeout(),
            db_init_schema: true,
            bind_addr: default_bind_addr(),
            log_dir: default_log_dir(),
        }
    }
}

// Secrets stay out of logs and panics.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("weather_base_url", &self.weather_base_url)
            .field(
                "weather_api_key",
                &self.weather_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout", &self.request_timeout)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<redacted>"))
            .field("cache_ttl", &self.cache_ttl)
            .field("db_dsn", &self.db_dsn)
            .field("db_pool_min", &self.db_pool_min)
            .field("db_pool_max", &self.db_pool_max)
            .field("db_pool_increment", &self.db_pool_increment)
            .field("db_pool_timeout", &self.db_pool_timeout)
            .field("db_init_schema", &self.db_init_schema)
            .field("bind_addr", &self.bind_addr)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl Settings {
    /// Load settings from `.env`, `wxproxy.toml` and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }

        let settings = config::Config::builder()
            .add_source(config::File::with_name(SETTINGS_FILE).required(false))
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize::<Settings>()?;

        Ok(settings)
    }

    /// Load settings and validate them.
    ///
    /// Errors fail the load. Warnings are handed back so they can be logged
    /// once logging is up, which itself depends on `LOG_DIR`.
    pub fn load_validated() -> Result<(Self, ValidationResult), ConfigError> {
        let settings = Self::load()?;
        let validation = settings.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        Ok((settings, validation))
    }

    /// Validate the settings.
    ///
    /// A missing API key or DSN is only a warning: the affected calls fail
    /// fast with a configuration error instead of the whole process.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        match self.weather_base_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                validate_url(url, "WEATHER_BASE_URL", &mut result)
            }
            _ => result.add_warning(
                "WEATHER_BASE_URL",
                "Not set - every weather call will fail",
            ),
        }

        if self.weather_api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            result.add_warning("WEATHER_API_KEY", "Not set - every weather call will fail");
        }

        if self.request_timeout == 0 {
            result.add_error("REQUEST_TIMEOUT", "Request timeout must be greater than 0");
        }

        if self.cache_ttl == 0 && self.redis_url.is_some() {
            result.add_warning("CACHE_TTL", "Cache TTL is 0 - caching disabled");
        }

        if let Some(url) = self.redis_url.as_deref().filter(|u| !u.trim().is_empty()) {
            if !(url.starts_with("redis://")
                || url.starts_with("rediss://")
                || url.starts_with("memory://"))
            {
                result.add_error(
                    "REDIS_URL",
                    "Cache URL must use redis://, rediss:// or memory://",
                );
            }
        }

        if self.db_dsn.as_deref().map_or(true, |d| d.trim().is_empty()) {
            result.add_warning("DB_DSN", "Not set - responses will not be persisted");
        }

        if self.db_pool_max > 0 {
            if self.db_pool_min > self.db_pool_max {
                result.add_error(
                    "DB_POOL_MIN",
                    format!(
                        "Pool minimum ({}) exceeds maximum ({})",
                        self.db_pool_min, self.db_pool_max
                    ),
                );
            }
            if self.db_pool_increment == 0 {
                result.add_error("DB_POOL_INCREMENT", "Pool increment must be greater than 0");
            }
            if self.db_pool_timeout == 0 {
                result.add_error("DB_POOL_TIMEOUT", "Pool timeout must be greater than 0");
            }
        }

        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            result.add_error(
                "BIND_ADDR",
                format!("Not a socket address: {}", self.bind_addr),
            );
        }

        result
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn db_pool_timeout(&self) -> Duration {
        Duration::from_secs(self.db_pool_timeout)
    }
}

/// Validate a URL field
fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
