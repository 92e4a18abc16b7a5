use chrono::Duration;
use domain::services::EventValidator;
use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;

/// Compiled-in copy of `config/default.toml`.
const DEFAULTS: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_auth_tier")]
    pub auth: RateTier,

    #[serde(default = "default_api_tier")]
    pub api: RateTier,

    #[serde(default = "default_ingestion_tier")]
    pub ingestion: RateTier,

    #[serde(default = "default_admin_tier")]
    pub admin: RateTier,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth: default_auth_tier(),
            api: default_api_tier(),
            ingestion: default_ingestion_tier(),
            admin: default_admin_tier(),
        }
    }
}

/// Requests allowed per window for one client and path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateTier {
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_active_ms")]
    pub max_active_ms: u64,

    #[serde(default = "default_max_visits_per_event")]
    pub max_visits_per_event: u32,

    #[serde(default = "default_max_event_age_days")]
    pub max_event_age_days: i64,

    #[serde(default = "default_max_future_skew_secs")]
    pub max_future_skew_secs: i64,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: i64,

    #[serde(default = "default_activity_days")]
    pub default_activity_days: u32,

    #[serde(default = "default_max_activity_days")]
    pub max_activity_days: u32,
}

impl LimitsConfig {
    pub fn event_validator(&self) -> EventValidator {
        EventValidator::new(
            self.max_active_ms,
            self.max_visits_per_event,
            Duration::days(self.max_event_age_days),
            Duration::seconds(self.max_future_skew_secs),
        )
    }

    /// Requested activity range clamped to `1..=max_activity_days`.
    pub fn activity_days(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_activity_days)
            .clamp(1, self.max_activity_days.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Confirmation token for anomaly cleanup. Empty disables the endpoint.
    #[serde(default)]
    pub cleanup_token: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_size() -> usize {
    1_048_576
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_auth_tier() -> RateTier {
    RateTier {
        max_requests: 5,
        window_secs: 900,
    }
}

fn default_api_tier() -> RateTier {
    RateTier {
        max_requests: 60,
        window_secs: 60,
    }
}

fn default_ingestion_tier() -> RateTier {
    RateTier {
        max_requests: 1000,
        window_secs: 60,
    }
}

fn default_admin_tier() -> RateTier {
    RateTier {
        max_requests: 10,
        window_secs: 60,
    }
}

fn default_max_active_ms() -> u64 {
    domain::services::event_validator::MAX_ACTIVE_MS
}

fn default_max_visits_per_event() -> u32 {
    domain::services::event_validator::MAX_VISITS_PER_EVENT
}

const MAX_EVENT_AGE_DAYS: i64 = 365;
const MAX_FUTURE_SKEW_SECS: i64 = 86_400;

fn default_max_event_age_days() -> i64 {
    shared::validation::MAX_TIMESTAMP_AGE_DAYS
}

fn default_max_future_skew_secs() -> i64 {
    shared::validation::MAX_FUTURE_TOLERANCE_SECS
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_leaderboard_size() -> i64 {
    domain::services::leaderboard::DEFAULT_LEADERBOARD_SIZE
}

fn default_activity_days() -> u32 {
    84
}

fn default_max_activity_days() -> u32 {
    365
}

fn default_cookie_name() -> String {
    "cribble_session".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl Config {
    /// Loads `config/default`, then optional `config/local`, then
    /// `CRIBBLE__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("CRIBBLE").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Builds a config from the compiled-in defaults plus `overrides`, without
    /// touching the filesystem or environment. Not validated.
    pub fn from_overrides(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULTS, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "database.url (set CRIBBLE__DATABASE__URL)".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "server.port".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue {
                field: "database.min_connections".to_string(),
                message: format!(
                    "must be <= max_connections ({})",
                    self.database.max_connections
                ),
            });
        }

        if self.limits.max_batch_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "limits.max_batch_size".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if !(1..=MAX_EVENT_AGE_DAYS).contains(&self.limits.max_event_age_days) {
            return Err(ConfigValidationError::InvalidValue {
                field: "limits.max_event_age_days".to_string(),
                message: format!("must be between 1 and {MAX_EVENT_AGE_DAYS}"),
            });
        }

        if !(0..=MAX_FUTURE_SKEW_SECS).contains(&self.limits.max_future_skew_secs) {
            return Err(ConfigValidationError::InvalidValue {
                field: "limits.max_future_skew_secs".to_string(),
                message: format!("must be between 0 and {MAX_FUTURE_SKEW_SECS}"),
            });
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
