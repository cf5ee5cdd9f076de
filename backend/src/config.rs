//! Service configuration loaded via OrthoConfig.
//!
//! Values layer from CLI flags, `LENDING_*` environment variables and an
//! optional config file. [`AppConfig`] holds the raw layered values;
//! [`AppConfig::resolve`] validates them into [`Settings`].

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::outbound::security::MIN_SECRET_LEN;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 60;
const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 180;
const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Startup configuration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {message}")]
    Load { message: String },
    #[error("missing required setting {field}")]
    Missing { field: &'static str },
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Raw layered configuration.
#[derive(Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "LENDING")]
pub struct AppConfig {
    /// PostgreSQL connection URL.
    pub database_url: Option<String>,
    /// Redis connection URL.
    pub redis_url: Option<String>,
    /// HS256 signing secret, at least 32 bytes.
    pub jwt_secret: Option<String>,
    /// Socket address to listen on.
    pub bind_addr: Option<String>,
    /// Requests allowed per client per minute.
    pub rate_limit_per_minute: Option<u32>,
    pub access_token_ttl_secs: Option<u64>,
    pub refresh_token_ttl_secs: Option<u64>,
    /// Per-request deadline.
    pub request_timeout_secs: Option<u64>,
    pub db_max_connections: Option<u32>,
    /// Mark auth cookies `Secure`: one of `1|0|true|false|yes|no|y|n`.
    /// Unset means secure.
    pub cookie_secure: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("db_max_connections", &self.db_max_connections)
            .field("cookie_secure", &self.cookie_secure)
            .finish_non_exhaustive()
    }
}

/// Validated settings the server starts from.
#[derive(Clone)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: Zeroizing<Vec<u8>>,
    pub bind_addr: SocketAddr,
    pub rate_limit_per_minute: u32,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub request_timeout: Duration,
    pub db_max_connections: u32,
    pub cookie_secure: bool,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bind_addr", &self.bind_addr)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("request_timeout", &self.request_timeout)
            .field("db_max_connections", &self.db_max_connections)
            .field("cookie_secure", &self.cookie_secure)
            .finish_non_exhaustive()
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|raw| !raw.is_empty())
        .ok_or(ConfigError::Missing { field })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn positive_secs(value: Option<u64>, default: u64, field: &'static str) -> Result<Duration, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(invalid(field, "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

impl AppConfig {
    /// Load from the process arguments, environment and config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a layer cannot be parsed.
    pub fn from_process() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os()).map_err(|err| ConfigError::Load {
            message: err.to_string(),
        })
    }

    /// Validate and apply defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing required settings or out-of-range
    /// values.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let database_url = required(self.database_url, "database_url")?;
        let redis_url = required(self.redis_url, "redis_url")?;
        let jwt_secret = Zeroizing::new(required(self.jwt_secret, "jwt_secret")?.into_bytes());
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(invalid(
                "jwt_secret",
                format!("must be at least {MIN_SECRET_LEN} bytes"),
            ));
        }

        let bind_addr = self
            .bind_addr
            .as_deref()
            .unwrap_or(DEFAULT_BIND_ADDR)
            .parse::<SocketAddr>()
            .map_err(|err| invalid("bind_addr", err.to_string()))?;

        let rate_limit_per_minute = self
            .rate_limit_per_minute
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE);
        if rate_limit_per_minute == 0 {
            return Err(invalid("rate_limit_per_minute", "must be greater than zero"));
        }

        let db_max_connections = self.db_max_connections.unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
        if db_max_connections == 0 {
            return Err(invalid("db_max_connections", "must be greater than zero"));
        }

        let cookie_secure = match self.cookie_secure.as_deref() {
            None => true,
            Some(raw) => parse_bool(raw)
                .ok_or_else(|| invalid("cookie_secure", "expected 1|0|true|false|yes|no|y|n"))?,
        };

        Ok(Settings {
            database_url,
            redis_url,
            jwt_secret,
            bind_addr,
            rate_limit_per_minute,
            access_token_ttl: positive_secs(
                self.access_token_ttl_secs,
                DEFAULT_ACCESS_TOKEN_TTL_SECS,
                "access_token_ttl_secs",
            )?,
            refresh_token_ttl: positive_secs(
                self.refresh_token_ttl_secs,
                DEFAULT_REFRESH_TOKEN_TTL_SECS,
                "refresh_token_ttl_secs",
            )?,
            request_timeout: positive_secs(
                self.request_timeout_secs,
                DEFAULT_REQUEST_TIMEOUT_SECS,
                "request_timeout_secs",
            )?,
            db_max_connections,
            cookie_secure,
        })
    }
}
