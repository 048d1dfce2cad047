use serde::Deserialize;
use std::net::SocketAddr;

use domain::services::WorkflowConfig as EngineConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub roster_sync: RosterSyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
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

impl DatabaseConfig {
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Shared secret expected in `X-Admin-Token`. Admin routes reject every
    /// request while this is empty.
    #[serde(default)]
    pub admin_token: String,

    /// Adds `Strict-Transport-Security`; enable only behind TLS termination.
    #[serde(default)]
    pub hsts_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Organization prefix of approval numbers.
    #[serde(default = "default_approval_number_prefix")]
    pub approval_number_prefix: String,

    /// School timezone as an offset from UTC.
    #[serde(default = "default_school_utc_offset_hours")]
    pub school_utc_offset_hours: i32,

    /// Interval of the background sweep job; 0 disables it. Reads always
    /// sweep regardless.
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            approval_number_prefix: default_approval_number_prefix(),
            school_utc_offset_hours: default_school_utc_offset_hours(),
            sweep_interval_secs: 0,
        }
    }
}

impl WorkflowConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            approval_number_prefix: self.approval_number_prefix.clone(),
            school_utc_offset_hours: self.school_utc_offset_hours,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterSyncConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Web app endpoint that rewrites the attendance sheet.
    #[serde(default)]
    pub webapp_url: String,

    #[serde(default = "default_roster_timeout")]
    pub timeout_secs: u64,

    /// First sheet row written.
    #[serde(default = "default_start_row")]
    pub start_row: u32,

    /// First sheet column written.
    #[serde(default = "default_start_col")]
    pub start_col: u32,
}

impl Default for RosterSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webapp_url: String::new(),
            timeout_secs: default_roster_timeout(),
            start_row: default_start_row(),
            start_col: default_start_col(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
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
fn default_approval_number_prefix() -> String {
    "DS".to_string()
}
fn default_school_utc_offset_hours() -> i32 {
    9
}
fn default_roster_timeout() -> u64 {
    20
}
fn default_start_row() -> u32 {
    4
}
fn default_start_col() -> u32 {
    1
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with PD__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("PD")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("security.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds from embedded defaults so tests do not depend on config files.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 10
            min_connections = 1
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []
            admin_token = ""
            hsts_enabled = false

            [workflow]
            approval_number_prefix = "DS"
            school_utc_offset_hours = 9
            sweep_interval_secs = 0

            [roster_sync]
            enabled = false
            webapp_url = ""
            timeout_secs = 20
            start_row = 4
            start_col = 1
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        // Validation is left to the caller so tests can build partial configs.
        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "PD__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if !(-12..=14).contains(&self.workflow.school_utc_offset_hours) {
            return Err(ConfigValidationError::InvalidValue(
                "school_utc_offset_hours must be between -12 and 14".to_string(),
            ));
        }

        if self.workflow.approval_number_prefix.trim().is_empty() {
            return Err(ConfigValidationError::InvalidValue(
                "approval_number_prefix cannot be empty".to_string(),
            ));
        }

        if self.roster_sync.enabled && self.roster_sync.webapp_url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "roster_sync.webapp_url must be set when roster sync is enabled".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
