use std::time::Duration;

use deadman_core::log_events::DEFAULT_PING_RETENTION;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Time between sweeps (default: 2 s).
    pub sweep_interval: Duration,
    /// Checks swept concurrently (default: 16).
    pub sweep_concurrency: usize,
    /// Pings kept per check (default: 100).
    pub ping_retention: i64,
    /// Upper bound on a single delivery, retries included (default: 30 s).
    pub delivery_timeout: Duration,
    /// Age after which a pending notification is considered abandoned
    /// (default: 600 s).
    pub pending_notification_ttl: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} must be a positive integer, got '{value}'")]
    Invalid { var: &'static str, value: String },
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                         | Default  |
    /// |---------------------------------|----------|
    /// | `DATABASE_URL`                  | required |
    /// | `SWEEP_INTERVAL_SECS`           | `2`      |
    /// | `SWEEP_CONCURRENCY`             | `16`     |
    /// | `PING_RETENTION`                | `100`    |
    /// | `DELIVERY_TIMEOUT_SECS`         | `30`     |
    /// | `PENDING_NOTIFICATION_TTL_SECS` | `600`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let positive = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(value) => match value.trim().parse::<u64>() {
                    Ok(parsed) if parsed > 0 => Ok(parsed),
                    _ => Err(ConfigError::Invalid { var, value }),
                },
            }
        };

        let retention = positive("PING_RETENTION", DEFAULT_PING_RETENTION as u64)?;

        Ok(Self {
            database_url,
            sweep_interval: Duration::from_secs(positive("SWEEP_INTERVAL_SECS", 2)?),
            sweep_concurrency: positive("SWEEP_CONCURRENCY", 16)? as usize,
            ping_retention: i64::try_from(retention).map_err(|_| ConfigError::Invalid {
                var: "PING_RETENTION",
                value: retention.to_string(),
            })?,
            delivery_timeout: Duration::from_secs(positive("DELIVERY_TIMEOUT_SECS", 30)?),
            pending_notification_ttl: Duration::from_secs(positive(
                "PENDING_NOTIFICATION_TTL_SECS",
                600,
            )?),
        })
    }
}
