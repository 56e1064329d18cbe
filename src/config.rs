//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Dispatch service configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Port the HTTP hooks listen on.
    pub http_port: u16,
    /// How long a trigger waits for the redistribution lock per attempt.
    pub lock_timeout: Duration,
    /// Attempts per trigger before giving up with a busy error.
    pub max_attempts: u32,
    /// Base delay between attempts (multiplied by the attempt number).
    pub retry_backoff: Duration,
    /// Interval of the orphan reconciliation sweep. `None` disables it.
    pub reconcile_interval: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/recharge-dispatch.db"),
            http_port: 8080,
            lock_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(200),
            reconcile_interval: None,
        }
    }
}

impl DispatchConfig {
    /// Build config from `DISPATCH_*` environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = std::env::var("DISPATCH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let http_port: u16 = std::env::var("DISPATCH_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.http_port);

        let lock_timeout = std::env::var("DISPATCH_LOCK_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.lock_timeout);

        let max_attempts: u32 = std::env::var("DISPATCH_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_attempts);

        let retry_backoff = std::env::var("DISPATCH_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_backoff);

        let reconcile_interval = std::env::var("DISPATCH_RECONCILE_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let config = Self {
            db_path,
            http_port,
            lock_timeout,
            max_attempts,
            retry_backoff,
            reconcile_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every trigger fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DISPATCH_MAX_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "DISPATCH_LOCK_TIMEOUT_MS".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
