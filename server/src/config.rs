//! Server configuration
//!
//! Configuration is loaded from environment variables. Unset or unparsable
//! variables keep their defaults.

use crate::orchestrator::WaveConfig;
use crate::run::RunLimits;
use crate::scenario::CredentialPool;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,

    /// Raw `token:role` list
    pub api_tokens: String,

    /// Run configuration
    pub run: RunSettings,
}

/// Everything a run needs besides its request
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Per-mode safety ceilings
    pub limits: RunLimits,
    /// Bound on every probe request
    pub probe_timeout: Duration,
    /// Wave scheduling
    pub waves: WaveConfig,
    /// Publish progress every N finished users (0 = auto)
    pub progress_every_vus: u64,
    /// Events buffered per observer before it starts skipping
    pub progress_channel_capacity: usize,
    /// Identities handed out to virtual users
    pub credentials: CredentialPool,
    /// Highest aggregate error rate that still passes
    pub max_error_rate: f64,
    /// How long finished runs stay queryable
    pub retention: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MAX_ERROR_RATE must be within 0..=1, got {0}")]
    InvalidErrorRate(f64),

    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_tokens: String::new(),
            run: RunSettings::default(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            limits: RunLimits::default(),
            probe_timeout: Duration::from_secs(30),
            waves: WaveConfig::default(),
            progress_every_vus: 0,
            progress_channel_capacity: crate::broadcast::DEFAULT_CHANNEL_CAPACITY,
            credentials: CredentialPool::default(),
            max_error_rate: 0.01,
            retention: Duration::from_secs(60 * 60), // 1 hour
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        // Auth config
        if let Ok(tokens) = env::var("LOADRUN_API_TOKENS") {
            config.api_tokens = tokens;
        }

        // Limits
        let limits = &mut config.run.limits;
        override_u64("TEST_MAX_VUS", &mut limits.test.max_vus);
        override_u64(
            "TEST_MAX_REQUESTS_PER_USER",
            &mut limits.test.max_requests_per_user,
        );
        override_u64("FULL_MAX_VUS", &mut limits.full.max_vus);
        override_u64(
            "FULL_MAX_REQUESTS_PER_USER",
            &mut limits.full.max_requests_per_user,
        );
        override_u64("MAX_DELAY_MS", &mut limits.max_delay_ms);

        // Probe config
        if let Ok(val) = env::var("PROBE_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.run.probe_timeout = Duration::from_secs(secs);
        }

        // Wave config
        if let Ok(val) = env::var("WAVE_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.run.waves.interval = Duration::from_secs(secs);
        }
        override_u64(
            "WAVE_CONCURRENCY_CAP",
            &mut config.run.waves.concurrency_cap,
        );
        if let Ok(val) = env::var("WAVE_PAUSE_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.run.waves.pause = Duration::from_millis(ms);
        }

        // Progress config
        override_u64("PROGRESS_EVERY_VUS", &mut config.run.progress_every_vus);
        if let Ok(val) = env::var("PROGRESS_CHANNEL_CAPACITY")
            && let Ok(capacity) = val.parse()
        {
            config.run.progress_channel_capacity = capacity;
        }

        // Test identities
        if let Ok(users) = env::var("LOADRUN_TEST_USERS") {
            config.run.credentials = CredentialPool::parse(&users);
        }

        // Report and registry config
        if let Ok(val) = env::var("MAX_ERROR_RATE")
            && let Ok(rate) = val.parse()
        {
            config.run.max_error_rate = rate;
        }
        if let Ok(val) = env::var("RUN_RETENTION_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.run.retention = Duration::from_secs(secs);
        }

        config
    }

    /// Reject settings that would make every run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let run = &self.run;
        if !(0.0..=1.0).contains(&run.max_error_rate) {
            return Err(ConfigError::InvalidErrorRate(run.max_error_rate));
        }
        if run.limits.test.max_vus == 0 {
            return Err(ConfigError::ZeroLimit("TEST_MAX_VUS"));
        }
        if run.limits.full.max_vus == 0 {
            return Err(ConfigError::ZeroLimit("FULL_MAX_VUS"));
        }
        if run.waves.concurrency_cap == 0 {
            return Err(ConfigError::ZeroLimit("WAVE_CONCURRENCY_CAP"));
        }
        if run.progress_channel_capacity == 0 {
            return Err(ConfigError::ZeroLimit("PROGRESS_CHANNEL_CAPACITY"));
        }
        Ok(())
    }
}

fn override_u64(name: &str, target: &mut u64) {
    if let Ok(val) = env::var(name)
        && let Ok(v) = val.parse()
    {
        *target = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.run.probe_timeout, Duration::from_secs(30));
        assert_eq!(config.run.limits.test.max_vus, 50);
        assert_eq!(config.run.limits.full.max_requests_per_user, 50);
        assert_eq!(config.run.waves.concurrency_cap, 100);
        assert_eq!(config.run.credentials.len(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env() {
        // This test doesn't set env vars, so it should return defaults
        let config = Config::from_env();
        assert_eq!(config.port, Config::default().port);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.run.max_error_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidErrorRate(_))
        ));

        let mut config = Config::default();
        config.run.limits.full.max_vus = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroLimit("FULL_MAX_VUS"))
        ));

        let mut config = Config::default();
        config.run.waves.concurrency_cap = 0;
        assert!(config.validate().is_err());
    }
}
