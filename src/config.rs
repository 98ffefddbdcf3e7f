use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_HOLD_DAYS: i64 = 3;
const DEFAULT_MAX_EXTENSION_DAYS: i64 = 7;
const DEFAULT_MAX_ACTIVE_PER_USER: u64 = 3;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Policy knobs for the marking engine and quota enforcer.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReservationPolicy {
    /// Days a fresh marking is held before auto-expiry.
    #[serde(default = "default_hold_days")]
    pub default_hold_days: i64,

    /// Ceiling on extension length; also caps the creation duration.
    #[serde(default = "default_max_extension_days")]
    pub max_extension_days: i64,

    /// Per-user ceiling on concurrently live markings plus requests.
    #[serde(default = "default_max_active_per_user")]
    pub max_active_per_user: u64,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            default_hold_days: DEFAULT_HOLD_DAYS,
            max_extension_days: DEFAULT_MAX_EXTENSION_DAYS,
            max_active_per_user: DEFAULT_MAX_ACTIVE_PER_USER,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Interval of the background marking expiry sweep, in seconds.
    /// Zero disables the in-process loop (an external scheduler can still
    /// drive the sweep through the CLI or the HTTP hook).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Reservation policy
    #[serde(default)]
    pub reservation: ReservationPolicy,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_hold_days() -> i64 {
    DEFAULT_HOLD_DAYS
}
fn default_max_extension_days() -> i64 {
    DEFAULT_MAX_EXTENSION_DAYS
}
fn default_max_active_per_user() -> u64 {
    DEFAULT_MAX_ACTIVE_PER_USER
}
fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl AppConfig {
    /// Direct constructor, used mainly by tests and tooling.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            sweep_interval_secs: 0,
            reservation: ReservationPolicy::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Loads configuration from `config/` files and `APP_`-prefixed environment
/// variables, the latter taking precedence.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", environment);

    let mut builder = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT)?
        .set_default("environment", environment.clone())?;

    let default_path = Path::new(CONFIG_DIR).join("default");
    builder = builder.add_source(File::from(default_path).required(false));
    let env_path = Path::new(CONFIG_DIR).join(&environment);
    builder = builder.add_source(File::from(env_path).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("Invalid configuration: {}", e)))?;

    if app_config.reservation.default_hold_days < 1
        || app_config.reservation.max_extension_days < app_config.reservation.default_hold_days
    {
        return Err(ConfigError::Message(
            "reservation policy: default_hold_days must be >= 1 and <= max_extension_days"
                .to_string(),
        ));
    }

    Ok(app_config)
}

/// Initializes the global tracing subscriber. `RUST_LOG` overrides the
/// configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("sarpras_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults() {
        let policy = ReservationPolicy::default();
        assert_eq!(policy.default_hold_days, 3);
        assert_eq!(policy.max_extension_days, 7);
        assert_eq!(policy.max_active_per_user, 3);
    }

    #[test]
    fn direct_constructor_defaults() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            18080,
            "test".into(),
        );
        assert!(!cfg.auto_migrate);
        assert_eq!(cfg.sweep_interval_secs, 0);
        assert!(!cfg.is_production());
    }
}
