//! Backup stage configuration.
//!
//! Loaded from TOML, then overridden from `HOTBACKUP_*` environment variables,
//! then validated:
//!
//! ```toml
//! lock_wait_timeout_secs = 86400
//! start_wait_timeout_secs = 30
//! flush_failure_policy = "fatal_on_session_error"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::BackupError;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "HOTBACKUP_";

/// What a failed table flush during `BLOCK_DDL` means for the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushFailurePolicy {
    /// Fatal only if the session carries an error afterwards.
    #[default]
    FatalOnSessionError,
    /// Never fatal.
    Ignore,
}

impl std::str::FromStr for FlushFailurePolicy {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal_on_session_error" => Ok(Self::FatalOnSessionError),
            "ignore" => Ok(Self::Ignore),
            other => Err(BackupError::config(format!(
                "unknown flush failure policy '{other}'"
            ))),
        }
    }
}

/// Backup stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupConfig {
    /// Default lock-wait timeout for new sessions, in seconds.
    pub lock_wait_timeout_secs: u64,
    /// Limit on waiting for another session's backup to end; `None` waits
    /// until the running backup ends or the session is killed.
    pub start_wait_timeout_secs: Option<u64>,
    /// How a failed non-transactional table flush is treated.
    pub flush_failure_policy: FlushFailurePolicy,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            lock_wait_timeout_secs: 86_400,
            start_wait_timeout_secs: None,
            flush_failure_policy: FlushFailurePolicy::default(),
        }
    }
}

impl BackupConfig {
    /// Lock-wait timeout as a `Duration`.
    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_wait_timeout_secs)
    }

    /// Backup slot wait limit as a `Duration`.
    pub fn start_wait_timeout(&self) -> Option<Duration> {
        self.start_wait_timeout_secs.map(Duration::from_secs)
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, BackupError> {
        toml::from_str(content).map_err(|e| BackupError::config(format!("invalid TOML: {e}")))
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, BackupError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackupError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `HOTBACKUP_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) -> Result<(), BackupError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `HOTBACKUP_*` overrides from `vars`. Unrelated variables are ignored.
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<(), BackupError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "LOCK_WAIT_TIMEOUT_SECS" => {
                    self.lock_wait_timeout_secs = parse_secs(name, value)?;
                }
                "START_WAIT_TIMEOUT_SECS" => {
                    self.start_wait_timeout_secs = if value.trim().is_empty() {
                        None
                    } else {
                        Some(parse_secs(name, value)?)
                    };
                }
                "FLUSH_FAILURE_POLICY" => {
                    self.flush_failure_policy = value.parse()?;
                }
                _ => tracing::debug!(variable = %key.as_ref(), "ignoring unknown override"),
            }
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), BackupError> {
        if self.lock_wait_timeout_secs == 0 {
            return Err(BackupError::config("lock_wait_timeout_secs must be positive"));
        }
        if self.start_wait_timeout_secs == Some(0) {
            return Err(BackupError::config(
                "start_wait_timeout_secs must be positive when set",
            ));
        }
        Ok(())
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64, BackupError> {
    value
        .trim()
        .parse()
        .map_err(|e| BackupError::config(format!("{ENV_PREFIX}{name}: {e}")))
}
