use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_label(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub events: EventDeliveryConfig,
}

impl AppConfig {
    /// Read settings from the process environment, after loading `.env` if
    /// one is present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let max_attempts: u32 = parse_var("APP_EVENT_RETRY_ATTEMPTS", "3", |_| {
            ConfigError::InvalidRetryAttempts
        })?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts);
        }
        let backoff_ms: u64 = parse_var("APP_EVENT_RETRY_BACKOFF_MS", "50", |_| {
            ConfigError::InvalidRetryBackoff
        })?;

        Ok(Self {
            environment: AppEnvironment::from_label(&var_or("APP_ENV", "development")),
            server: ServerConfig {
                host: var_or("APP_HOST", "127.0.0.1"),
                port: parse_var("APP_PORT", "3000", |_| ConfigError::InvalidPort)?,
            },
            telemetry: TelemetryConfig {
                log_level: var_or("APP_LOG_LEVEL", "info"),
            },
            events: EventDeliveryConfig {
                max_attempts,
                initial_backoff: Duration::from_millis(backoff_ms),
            },
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(
    key: &str,
    default: &str,
    invalid: impl FnOnce(T::Err) -> ConfigError,
) -> Result<T, ConfigError> {
    var_or(key, default).trim().parse::<T>().map_err(invalid)
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Retry budget for lifecycle event publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDeliveryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for EventDeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost {
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("APP_EVENT_RETRY_ATTEMPTS must be a positive integer")]
    InvalidRetryAttempts,
    #[error("APP_EVENT_RETRY_BACKOFF_MS must be a whole number of milliseconds")]
    InvalidRetryBackoff,
}
