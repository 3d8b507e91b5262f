//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scudo";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;

const DEFAULT_CACHE_RESPONSE_LIMIT: usize = 512;
const DEFAULT_CACHE_BODY_LIMIT_BYTES: usize = 1024 * 1024;
const DEFAULT_CACHE_TTL_SECS: u64 = 120;
const DEFAULT_CACHE_SHORT_TTL_SECS: u64 = 60;
const DEFAULT_CACHE_MEDIUM_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_LONG_TTL_SECS: u64 = 3600;

const DEFAULT_DUPLICATE_REPETITION_THRESHOLD: usize = 3;
const DEFAULT_SLOW_QUERY_MS: u64 = 100;
const DEFAULT_QUERY_COUNT_WARNING: usize = 50;
const DEFAULT_QUERY_COUNT_CRITICAL: usize = 100;
const DEFAULT_SLOW_REQUEST_MS: u64 = 500;

const DEFAULT_WARNING_CONNECTIONS: i64 = 50;
const DEFAULT_EMERGENCY_CONNECTIONS: i64 = 80;
const DEFAULT_IDLE_TTL_SECS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

fn default_bypass_paths() -> Vec<String> {
    vec![
        "/admin/".to_string(),
        "/login/".to_string(),
        "/logout/".to_string(),
    ]
}

fn default_short_paths() -> Vec<String> {
    vec!["/dashboard/".to_string(), "/notifications/".to_string()]
}

fn default_medium_paths() -> Vec<String> {
    vec!["-list/".to_string(), "/reports/".to_string()]
}

fn default_long_paths() -> Vec<String> {
    vec!["/help/".to_string(), "/pages/".to_string()]
}

/// Command-line arguments for the scudo binary.
#[derive(Debug, Parser)]
#[command(name = "scudo", version, about = "Scudo database-protection gateway")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SCUDO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the scudo HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle the response cache stage.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the connection count that logs a warning.
    #[arg(long = "governor-warning-connections", value_name = "COUNT")]
    pub governor_warning_connections: Option<i64>,

    /// Override the connection count that triggers the emergency sweep.
    #[arg(long = "governor-emergency-connections", value_name = "COUNT")]
    pub governor_emergency_connections: Option<i64>,

    /// Override the idle TTL for the periodic sweep.
    #[arg(long = "governor-idle-ttl-seconds", value_name = "SECONDS")]
    pub governor_idle_ttl_seconds: Option<u64>,

    /// Override the minimum spacing between periodic sweeps.
    #[arg(long = "governor-sweep-interval-seconds", value_name = "SECONDS")]
    pub governor_sweep_interval_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub observer: ObserverSettings,
    pub governor: GovernorSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub response_limit: usize,
    pub body_limit_bytes: usize,
    pub default_ttl: Duration,
    pub bypass: Vec<String>,
    pub short_ttl: Duration,
    pub short_paths: Vec<String>,
    pub medium_ttl: Duration,
    pub medium_paths: Vec<String>,
    pub long_ttl: Duration,
    pub long_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ObserverSettings {
    pub duplicate_repetition_threshold: usize,
    pub slow_query: Duration,
    pub query_count_warning: usize,
    pub query_count_critical: usize,
    pub slow_request: Duration,
}

#[derive(Debug, Clone)]
pub struct GovernorSettings {
    pub warning_connections: i64,
    pub emergency_connections: i64,
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SCUDO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    observer: RawObserverSettings,
    governor: RawGovernorSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    response_limit: Option<usize>,
    body_limit_bytes: Option<usize>,
    default_ttl_seconds: Option<u64>,
    bypass: Option<Vec<String>>,
    short_ttl_seconds: Option<u64>,
    short_paths: Option<Vec<String>>,
    medium_ttl_seconds: Option<u64>,
    medium_paths: Option<Vec<String>>,
    long_ttl_seconds: Option<u64>,
    long_paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawObserverSettings {
    duplicate_repetition_threshold: Option<usize>,
    slow_query_ms: Option<u64>,
    query_count_warning: Option<usize>,
    query_count_critical: Option<usize>,
    slow_request_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGovernorSettings {
    warning_connections: Option<i64>,
    emergency_connections: Option<i64>,
    idle_ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(count) = overrides.governor_warning_connections {
            self.governor.warning_connections = Some(count);
        }
        if let Some(count) = overrides.governor_emergency_connections {
            self.governor.emergency_connections = Some(count);
        }
        if let Some(seconds) = overrides.governor_idle_ttl_seconds {
            self.governor.idle_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.governor_sweep_interval_seconds {
            self.governor.sweep_interval_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            observer,
            governor,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache),
            observer: build_observer_settings(observer)?,
            governor: build_governor_settings(governor)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_value).ok_or_else(|| {
        LoadError::invalid("database.max_connections", "must be greater than zero")
    })?;

    let acquire_secs = database
        .acquire_timeout_seconds
        .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS);
    if acquire_secs == 0 {
        return Err(LoadError::invalid(
            "database.acquire_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout: Duration::from_secs(acquire_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        response_limit: cache.response_limit.unwrap_or(DEFAULT_CACHE_RESPONSE_LIMIT),
        body_limit_bytes: cache
            .body_limit_bytes
            .unwrap_or(DEFAULT_CACHE_BODY_LIMIT_BYTES),
        default_ttl: Duration::from_secs(cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS)),
        bypass: cache.bypass.unwrap_or_else(default_bypass_paths),
        short_ttl: Duration::from_secs(
            cache.short_ttl_seconds.unwrap_or(DEFAULT_CACHE_SHORT_TTL_SECS),
        ),
        short_paths: cache.short_paths.unwrap_or_else(default_short_paths),
        medium_ttl: Duration::from_secs(
            cache
                .medium_ttl_seconds
                .unwrap_or(DEFAULT_CACHE_MEDIUM_TTL_SECS),
        ),
        medium_paths: cache.medium_paths.unwrap_or_else(default_medium_paths),
        long_ttl: Duration::from_secs(
            cache.long_ttl_seconds.unwrap_or(DEFAULT_CACHE_LONG_TTL_SECS),
        ),
        long_paths: cache.long_paths.unwrap_or_else(default_long_paths),
    }
}

fn build_observer_settings(observer: RawObserverSettings) -> Result<ObserverSettings, LoadError> {
    let query_count_warning = observer
        .query_count_warning
        .unwrap_or(DEFAULT_QUERY_COUNT_WARNING);
    let query_count_critical = observer
        .query_count_critical
        .unwrap_or(DEFAULT_QUERY_COUNT_CRITICAL);
    if query_count_critical < query_count_warning {
        return Err(LoadError::invalid(
            "observer.query_count_critical",
            "must not be below observer.query_count_warning",
        ));
    }

    Ok(ObserverSettings {
        duplicate_repetition_threshold: observer
            .duplicate_repetition_threshold
            .unwrap_or(DEFAULT_DUPLICATE_REPETITION_THRESHOLD),
        slow_query: Duration::from_millis(observer.slow_query_ms.unwrap_or(DEFAULT_SLOW_QUERY_MS)),
        query_count_warning,
        query_count_critical,
        slow_request: Duration::from_millis(
            observer.slow_request_ms.unwrap_or(DEFAULT_SLOW_REQUEST_MS),
        ),
    })
}

fn build_governor_settings(governor: RawGovernorSettings) -> Result<GovernorSettings, LoadError> {
    let warning_connections = governor
        .warning_connections
        .unwrap_or(DEFAULT_WARNING_CONNECTIONS);
    let emergency_connections = governor
        .emergency_connections
        .unwrap_or(DEFAULT_EMERGENCY_CONNECTIONS);

    if warning_connections <= 0 {
        return Err(LoadError::invalid(
            "governor.warning_connections",
            "must be greater than zero",
        ));
    }
    if emergency_connections <= warning_connections {
        return Err(LoadError::invalid(
            "governor.emergency_connections",
            "must be greater than governor.warning_connections",
        ));
    }

    Ok(GovernorSettings {
        warning_connections,
        emergency_connections,
        idle_ttl: Duration::from_secs(governor.idle_ttl_seconds.unwrap_or(DEFAULT_IDLE_TTL_SECS)),
        sweep_interval: Duration::from_secs(
            governor
                .sweep_interval_seconds
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        ),
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    format!("{host}:{port}")
        .parse()
        .map_err(|err| format!("failed to parse listener address: {err}"))
}

/// Parse the CLI and load settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[cfg(test)]
mod tests;
