//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

use crate::rbac::Mode;
use crate::telemetry::LoggingConfig;

/// Main process configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WardenConfig {
    /// Database configuration (absent = in-memory store)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Security defaults applied before any configuration is persisted
    #[serde(default)]
    pub security: SecurityDefaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Time to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Apply bundled migrations on connect
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Initial security settings, used until the first `update_config` persists
/// a value of its own.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityDefaults {
    /// Evaluation mode
    #[serde(default)]
    pub mode: Mode,

    /// Lifetime of issued authorization tokens
    #[serde(default = "default_token_lifetime", with = "humantime_serde")]
    pub token_lifetime: Duration,

    /// Whether users may authenticate with run-as auth contexts
    #[serde(default = "default_allow_run_as")]
    pub allow_run_as: bool,

    /// Failed logins tolerated before a user is blocked
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
}

impl Default for SecurityDefaults {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            token_lifetime: default_token_lifetime(),
            allow_run_as: default_allow_run_as(),
            max_login_attempts: default_max_login_attempts(),
        }
    }
}

// Default value functions
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_run_migrations() -> bool { true }
fn default_token_lifetime() -> Duration { Duration::from_secs(900) }
fn default_allow_run_as() -> bool { true }
fn default_max_login_attempts() -> u32 { 50 }

impl WardenConfig {
    /// Load configuration from the environment (`WARDEN__SECTION__KEY`).
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("WARDEN").separator("__"))
            .build()?;

        let cfg: WardenConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("WARDEN").separator("__"))
            .build()?;

        let cfg: WardenConfig = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_security_defaults() {
        let defaults = SecurityDefaults::default();
        assert_eq!(defaults.mode, Mode::White);
        assert_eq!(defaults.token_lifetime, Duration::from_secs(900));
        assert!(defaults.allow_run_as);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[database]
url = "postgres://warden@localhost/warden"
acquire_timeout = "2s"

[logging]
level = "debug"
format = "compact"

[security]
mode = "black"
token_lifetime = "1h"
"#
        )
        .unwrap();

        let cfg = WardenConfig::from_file(file.path().to_str().unwrap()).unwrap();
        let database = cfg.database.unwrap();
        assert_eq!(database.url, "postgres://warden@localhost/warden");
        assert_eq!(database.max_connections, 20);
        assert_eq!(database.acquire_timeout, Duration::from_secs(2));
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.security.mode, Mode::Black);
        assert_eq!(cfg.security.token_lifetime, Duration::from_secs(3600));
        assert_eq!(cfg.security.max_login_attempts, 50);
    }
}
