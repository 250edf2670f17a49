//! Security configuration store.
//!
//! The persisted configuration holds the evaluation mode and token settings.
//! Updates are partial: a patch names the keys to change and everything else
//! keeps its value. Some keys change how every outstanding token must be
//! judged, so an update reports whether all tokens have to be revoked.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::config::SecurityDefaults;
use crate::error::{Result, WardenError};
use crate::rbac::Mode;
use crate::store::{ReadTx, WriteTx};
use crate::telemetry::metrics::CONFIG_UPDATES_TOTAL;

/// Upper bound for `auth_token_exp_timeout`, in seconds (ten years).
pub const MAX_AUTH_TOKEN_EXP_TIMEOUT: u64 = 10 * 365 * 24 * 60 * 60;

/// Persisted security settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Incremented by every successful update; `0` means never persisted.
    #[serde(default)]
    pub version: u64,
    pub mode: Mode,
    /// Token lifetime in seconds.
    pub auth_token_exp_timeout: u64,
    pub allow_run_as: bool,
    pub max_login_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_text: Option<String>,
}

impl SecurityConfig {
    pub fn from_defaults(defaults: &SecurityDefaults) -> Self {
        Self {
            version: 0,
            mode: defaults.mode,
            auth_token_exp_timeout: defaults.token_lifetime.as_secs(),
            allow_run_as: defaults.allow_run_as,
            max_login_attempts: defaults.max_login_attempts,
            banner_text: None,
        }
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.auth_token_exp_timeout)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::from_defaults(&SecurityDefaults::default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Patches
// ─────────────────────────────────────────────────────────────────────────────

/// A partial update. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigPatch {
    #[serde(default, alias = "rbac_mode")]
    pub mode: Option<String>,
    #[serde(default)]
    pub auth_token_exp_timeout: Option<u64>,
    #[serde(default)]
    pub allow_run_as: Option<bool>,
    #[serde(default)]
    pub max_login_attempts: Option<u32>,
    #[serde(default)]
    pub banner_text: Option<String>,
}

impl ConfigPatch {
    /// Parse a JSON object into a patch.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(WardenError::validation(
                "Security configuration patch must be an object",
            ));
        }
        let patch: Self = serde_json::from_value(value.clone())?;
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.changed_keys().is_empty()
    }

    /// Names of the keys this patch sets.
    pub fn changed_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.mode.is_some() {
            keys.push("mode");
        }
        if self.auth_token_exp_timeout.is_some() {
            keys.push("auth_token_exp_timeout");
        }
        if self.allow_run_as.is_some() {
            keys.push("allow_run_as");
        }
        if self.max_login_attempts.is_some() {
            keys.push("max_login_attempts");
        }
        if self.banner_text.is_some() {
            keys.push("banner_text");
        }
        keys
    }

    /// Whether applying this patch invalidates every issued token.
    ///
    /// Only `banner_text` is cosmetic.
    pub fn requires_revocation(&self) -> bool {
        self.mode.is_some()
            || self.auth_token_exp_timeout.is_some()
            || self.allow_run_as.is_some()
            || self.max_login_attempts.is_some()
    }

    /// Merge onto `current`, returning the new configuration with its version
    /// bumped. Nothing is modified when a value is invalid.
    pub fn apply_to(&self, current: &SecurityConfig) -> Result<SecurityConfig> {
        if self.is_empty() {
            return Err(WardenError::validation(
                "Security configuration patch changes nothing",
            ));
        }

        let mut next = current.clone();
        if let Some(mode) = &self.mode {
            next.mode = mode.parse()?;
        }
        if let Some(timeout) = self.auth_token_exp_timeout {
            if timeout == 0 {
                return Err(WardenError::validation(
                    "auth_token_exp_timeout must be greater than zero",
                ));
            }
            if timeout > MAX_AUTH_TOKEN_EXP_TIMEOUT {
                return Err(WardenError::validation(format!(
                    "auth_token_exp_timeout must not exceed {} seconds",
                    MAX_AUTH_TOKEN_EXP_TIMEOUT
                )));
            }
            next.auth_token_exp_timeout = timeout;
        }
        if let Some(allow) = self.allow_run_as {
            next.allow_run_as = allow;
        }
        if let Some(attempts) = self.max_login_attempts {
            if attempts == 0 {
                return Err(WardenError::validation(
                    "max_login_attempts must be greater than zero",
                ));
            }
            next.max_login_attempts = attempts;
        }
        if let Some(banner) = &self.banner_text {
            next.banner_text = Some(banner.clone());
        }
        next.version = current.version + 1;
        Ok(next)
    }
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub config: SecurityConfig,
    pub requires_revocation: bool,
    pub changed_keys: Vec<&'static str>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Reads and updates the persisted configuration, falling back to process
/// defaults until the first update.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfigStore {
    defaults: SecurityDefaults,
}

impl SecurityConfigStore {
    pub fn new(defaults: SecurityDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &SecurityDefaults {
        &self.defaults
    }

    pub async fn get_config<T: ReadTx + ?Sized>(&self, tx: &mut T) -> Result<SecurityConfig> {
        Ok(tx
            .security_config()
            .await?
            .unwrap_or_else(|| SecurityConfig::from_defaults(&self.defaults)))
    }

    /// Validate and persist a patch inside `tx`.
    ///
    /// The caller owns revocation: when `requires_revocation` is set it must
    /// raise the global cutoff in the same unit-of-work.
    pub async fn update_config<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        patch: &serde_json::Value,
    ) -> Result<ConfigUpdate> {
        let patch = ConfigPatch::from_value(patch)?;
        let current = self.get_config(tx).await?;
        let config = patch.apply_to(&current)?;
        tx.save_security_config(&config).await?;

        let update = ConfigUpdate {
            requires_revocation: patch.requires_revocation(),
            changed_keys: patch.changed_keys(),
            config,
        };
        counter!(
            CONFIG_UPDATES_TOTAL,
            "revocation" => if update.requires_revocation { "true" } else { "false" }
        )
        .increment(1);
        info!(
            version = update.config.version,
            mode = %update.config.mode,
            keys = ?update.changed_keys,
            requires_revocation = update.requires_revocation,
            "Security configuration updated"
        );
        Ok(update)
    }
}
