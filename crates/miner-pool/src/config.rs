//! Pool configuration
//!
//! Durations are stored as milliseconds so TOML files stay flat:
//!
//! ```toml
//! worker_path = "/usr/local/bin/miner-worker"
//! request_grace_ms = 120000
//! timeout_policy = "no_retry"
//! ```

use crate::error::PoolError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What happens when a pending request outlives its grace period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Reset the request's age while retries remain, then reject
    #[default]
    ExtendDeadline,
    /// Reject on the first expiry
    NoRetry,
}

/// Session pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker executable used by the process spawner
    pub worker_path: PathBuf,
    /// Idle age after which a session is reaped
    pub process_max_age_ms: u64,
    /// Period of the idle reap
    pub reap_interval_ms: u64,
    /// Age after which a pending request counts as expired
    pub request_grace_ms: u64,
    /// Period of the timeout sweep
    pub sweep_interval_ms: u64,
    /// Deadline extensions granted before a request times out
    pub max_retries: u32,
    /// Sends between opportunistic sweeps; 0 disables them
    pub sweep_every: u64,
    /// Expiry handling
    pub timeout_policy: TimeoutPolicy,
    /// Wait for a worker to exit after `SHUTDOWN`
    pub shutdown_timeout_ms: u64,
    /// Bound of each worker's request and response channels
    pub channel_capacity: usize,
    /// Reject a dead worker's pending requests at once instead of letting
    /// them time out
    pub fail_pending_on_disconnect: bool,
}

impl PoolConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys take their defaults
    ///
    /// # Errors
    /// - `PoolError::Config` for malformed TOML or invalid values
    pub fn from_toml_str(s: &str) -> Result<Self, PoolError> {
        let config: Self = toml::from_str(s).map_err(|e| PoolError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// - `PoolError::Config` if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// - `PoolError::Config` naming the first invalid field
    pub fn validate(&self) -> Result<(), PoolError> {
        let positive = [
            ("process_max_age_ms", self.process_max_age_ms),
            ("reap_interval_ms", self.reap_interval_ms),
            ("request_grace_ms", self.request_grace_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("shutdown_timeout_ms", self.shutdown_timeout_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(PoolError::Config(format!("{name} must be positive")));
        }
        if self.channel_capacity == 0 {
            return Err(PoolError::Config("channel_capacity must be positive".to_string()));
        }
        Ok(())
    }

    /// With worker executable
    #[inline]
    #[must_use]
    pub fn with_worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = path.into();
        self
    }

    /// With idle age before reaping
    #[inline]
    #[must_use]
    pub fn with_process_max_age(mut self, age: Duration) -> Self {
        self.process_max_age_ms = millis(age);
        self
    }

    /// With reap period
    #[inline]
    #[must_use]
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval_ms = millis(interval);
        self
    }

    /// With request grace period
    #[inline]
    #[must_use]
    pub fn with_request_grace(mut self, grace: Duration) -> Self {
        self.request_grace_ms = millis(grace);
        self
    }

    /// With sweep period
    #[inline]
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = millis(interval);
        self
    }

    /// With deadline extensions per request
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// With opportunistic sweep frequency
    #[inline]
    #[must_use]
    pub fn with_sweep_every(mut self, sends: u64) -> Self {
        self.sweep_every = sends;
        self
    }

    /// With expiry policy
    #[inline]
    #[must_use]
    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// With shutdown wait
    #[inline]
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = millis(timeout);
        self
    }

    /// With channel bound
    #[inline]
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// With immediate rejection of a dead worker's pending requests
    #[inline]
    #[must_use]
    pub fn with_fail_pending_on_disconnect(mut self, fail: bool) -> Self {
        self.fail_pending_on_disconnect = fail;
        self
    }

    /// Idle age before reaping
    #[inline]
    #[must_use]
    pub fn process_max_age(&self) -> Duration {
        Duration::from_millis(self.process_max_age_ms)
    }

    /// Reap period
    #[inline]
    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    /// Request grace period
    #[inline]
    #[must_use]
    pub fn request_grace(&self) -> Duration {
        Duration::from_millis(self.request_grace_ms)
    }

    /// Sweep period
    #[inline]
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Shutdown wait
    #[inline]
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_path: PathBuf::from("miner-worker"),
            process_max_age_ms: 2 * 60 * 60 * 1000,
            reap_interval_ms: 30 * 60 * 1000,
            request_grace_ms: 2 * 60 * 1000,
            sweep_interval_ms: 30 * 1000,
            max_retries: 10,
            sweep_every: 100,
            timeout_policy: TimeoutPolicy::ExtendDeadline,
            shutdown_timeout_ms: 10 * 1000,
            channel_capacity: 64,
            fail_pending_on_disconnect: false,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.process_max_age(), Duration::from_secs(7200));
        assert_eq!(config.reap_interval(), Duration::from_secs(1800));
        assert_eq!(config.request_grace(), Duration::from_secs(120));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.sweep_every, 100);
        assert_eq!(config.timeout_policy, TimeoutPolicy::ExtendDeadline);
        assert!(!config.fail_pending_on_disconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_and_defaults() {
        let config = PoolConfig::from_toml_str(
            r#"
            worker_path = "/opt/miner/bin/miner-worker"
            request_grace_ms = 500
            timeout_policy = "no_retry"
            "#,
        )
        .unwrap();
        assert_eq!(config.worker_path, PathBuf::from("/opt/miner/bin/miner-worker"));
        assert_eq!(config.request_grace(), Duration::from_millis(500));
        assert_eq!(config.timeout_policy, TimeoutPolicy::NoRetry);
        assert_eq!(config.max_retries, 10);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            PoolConfig::from_toml_str("channel_capacity = 0"),
            Err(PoolError::Config(_))
        ));
        assert!(matches!(
            PoolConfig::from_toml_str("sweep_interval_ms = 0"),
            Err(PoolError::Config(_))
        ));
        assert!(matches!(
            PoolConfig::from_toml_str("timeout_policy = \"sometimes\""),
            Err(PoolError::Config(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.toml");
        std::fs::write(&path, "max_retries = 3\nsweep_every = 0\n").unwrap();
        let config = PoolConfig::load(&path).unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.sweep_every, 0);

        assert!(PoolConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn builders() {
        let config = PoolConfig::new()
            .with_request_grace(Duration::from_secs(1))
            .with_max_retries(0)
            .with_timeout_policy(TimeoutPolicy::NoRetry)
            .with_channel_capacity(4)
            .with_fail_pending_on_disconnect(true);
        assert_eq!(config.request_grace_ms, 1000);
        assert!(config.fail_pending_on_disconnect);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.channel_capacity, 4);
    }
}
