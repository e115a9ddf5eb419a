//! # Service Configuration
//!
//! Command-line flags, each of which may also be supplied through the
//! environment. Parsed once in `main` and shared read-only through
//! [`AppState`](crate::state::AppState).

use std::fmt;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use thiserror::Error;

use crate::middleware::rate_limit::MAX_SWEEP_INTERVAL;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("limiter rate must be a positive number of requests per second, got {0}")]
    InvalidRate(f64),

    #[error("limiter burst must be at least 1")]
    ZeroBurst,

    #[error("limiter sweep interval must be at least 1 second")]
    ZeroSweepInterval,

    #[error("limiter sweep interval must not exceed {max} seconds, got {0}", max = MAX_SWEEP_INTERVAL.as_secs())]
    SweepIntervalTooLong(u64),

    #[error("database pool must allow at least 1 connection")]
    ZeroConnections,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

#[derive(Parser, Clone)]
#[command(name = "moviescreen-api", about = "Movie catalog JSON API")]
pub struct Config {
    /// HTTP listen port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Deployment environment.
    #[arg(long = "env", env = "APP_ENV", value_enum, default_value = "development")]
    pub env: Environment,

    /// Version string reported by the healthcheck.
    #[arg(long, env = "APP_VERSION", default_value = "1.0.0")]
    pub version_tag: String,

    /// Postgres DSN. Without one the service runs on in-memory stores.
    #[arg(long, env = "DATABASE_URL")]
    pub db_dsn: Option<String>,

    #[arg(long, env = "DB_MAX_OPEN_CONNS", default_value_t = 25)]
    pub db_max_open_conns: u32,

    /// Seconds an idle pooled connection is kept.
    #[arg(long = "db-max-idle-time", env = "DB_MAX_IDLE_TIME", default_value_t = 900)]
    pub db_max_idle_time_secs: u64,

    #[arg(long, env = "LIMITER_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub limiter_enabled: bool,

    /// Sustained requests per second per client.
    #[arg(long, env = "LIMITER_RPS", default_value_t = 2.0)]
    pub limiter_rps: f64,

    /// Bucket capacity per client.
    #[arg(long, env = "LIMITER_BURST", default_value_t = 4)]
    pub limiter_burst: u32,

    /// Seconds between idle-client sweeps.
    #[arg(long = "limiter-sweep-interval", env = "LIMITER_SWEEP_INTERVAL", default_value_t = 60)]
    pub limiter_sweep_interval_secs: u64,

    /// HTTP mail relay endpoint. Without one, mail is only logged.
    #[arg(long, env = "MAIL_RELAY_URL")]
    pub mail_relay_url: Option<String>,

    #[arg(long, env = "MAIL_SENDER", default_value = "Moviescreen <no-reply@moviescreen.local>")]
    pub mail_sender: String,

    /// Space-separated list of trusted CORS origins; empty allows any.
    #[arg(long, env = "CORS_TRUSTED_ORIGINS", value_delimiter = ' ', num_args = 0..)]
    pub cors_trusted_origins: Vec<String>,
}

impl Config {
    /// Check cross-field constraints clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.limiter_rps.is_finite() && self.limiter_rps > 0.0) {
            return Err(ConfigError::InvalidRate(self.limiter_rps));
        }
        if self.limiter_burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        if self.limiter_sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        if self.limiter_sweep_interval_secs > MAX_SWEEP_INTERVAL.as_secs() {
            return Err(ConfigError::SweepIntervalTooLong(
                self.limiter_sweep_interval_secs,
            ));
        }
        if self.db_max_open_conns == 0 {
            return Err(ConfigError::ZeroConnections);
        }
        Ok(())
    }

    pub fn environment(&self) -> Environment {
        self.env
    }

    pub fn db_max_idle_time(&self) -> Duration {
        Duration::from_secs(self.db_max_idle_time_secs)
    }

    pub fn limiter_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.limiter_sweep_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            env: Environment::Development,
            version_tag: "1.0.0".to_string(),
            db_dsn: None,
            db_max_open_conns: 25,
            db_max_idle_time_secs: 900,
            limiter_enabled: true,
            limiter_rps: 2.0,
            limiter_burst: 4,
            limiter_sweep_interval_secs: 60,
            mail_relay_url: None,
            mail_sender: "Moviescreen <no-reply@moviescreen.local>".to_string(),
            cors_trusted_origins: Vec::new(),
        }
    }
}

/// Custom Debug that never prints the DSN, which carries credentials.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("env", &self.env)
            .field("version_tag", &self.version_tag)
            .field("db_dsn", &self.db_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("db_max_open_conns", &self.db_max_open_conns)
            .field("db_max_idle_time_secs", &self.db_max_idle_time_secs)
            .field("limiter_enabled", &self.limiter_enabled)
            .field("limiter_rps", &self.limiter_rps)
            .field("limiter_burst", &self.limiter_burst)
            .field("limiter_sweep_interval_secs", &self.limiter_sweep_interval_secs)
            .field("mail_relay_url", &self.mail_relay_url)
            .field("mail_sender", &self.mail_sender)
            .field("cors_trusted_origins", &self.cors_trusted_origins)
            .finish()
    }
}
