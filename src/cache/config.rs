//! Configuration for the entity cache

use crate::error::{CacheError, Result};
use crate::lock::DEFAULT_POLL_INTERVAL;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the entity cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCacheConfig {
    /// Pages not read for this long are eviction candidates
    pub cache_expiration: Duration,

    /// Delay between automatic sweeps
    pub sweep_interval: Duration,

    /// Random stretch applied to each sweep delay (0.0 - 1.0)
    /// Keeps caches created together from sweeping in lockstep
    pub sweep_jitter: f64,

    /// Start the periodic sweep task on construction
    pub enable_auto_sweep: bool,

    /// Retry period of the keyed lock
    pub lock_poll_interval: Duration,
}

impl Default for EntityCacheConfig {
    fn default() -> Self {
        Self {
            // 5 minutes
            cache_expiration: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(300),
            sweep_jitter: 0.0,
            enable_auto_sweep: true,
            lock_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl EntityCacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> EntityCacheConfigBuilder {
        EntityCacheConfigBuilder::default()
    }

    /// Build a configuration from the environment
    ///
    /// Loads `.env` if present, then reads `LD_CACHE_EXPIRATION_SECS`,
    /// `LD_CACHE_SWEEP_INTERVAL_SECS`, `LD_CACHE_LOCK_POLL_MS` and
    /// `LD_CACHE_AUTO_SWEEP`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = Self::builder();

        if let Some(secs) = env_number("LD_CACHE_EXPIRATION_SECS")? {
            builder = builder.cache_expiration(Duration::from_secs(secs));
        }
        if let Some(secs) = env_number("LD_CACHE_SWEEP_INTERVAL_SECS")? {
            builder = builder.sweep_interval(Duration::from_secs(secs));
        }
        if let Some(ms) = env_number("LD_CACHE_LOCK_POLL_MS")? {
            builder = builder.lock_poll_interval(Duration::from_millis(ms));
        }
        if let Ok(flag) = std::env::var("LD_CACHE_AUTO_SWEEP") {
            let enabled = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(CacheError::ConfigError(format!(
                        "LD_CACHE_AUTO_SWEEP: expected a boolean, got '{}'",
                        other
                    )))
                }
            };
            builder = builder.enable_auto_sweep(enabled);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_expiration.is_zero() {
            return Err(CacheError::ConfigError(
                "cache_expiration must be greater than 0".to_string(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "sweep_interval must be greater than 0".to_string(),
            ));
        }

        if self.sweep_jitter < 0.0 || self.sweep_jitter > 1.0 {
            return Err(CacheError::ConfigError(
                "sweep_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.lock_poll_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "lock_poll_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Delay before the next sweep with jitter applied
    ///
    /// Jitter only lengthens the delay, so sweeps never run more often
    /// than `sweep_interval`.
    pub fn sweep_delay(&self) -> Duration {
        if self.sweep_jitter == 0.0 {
            return self.sweep_interval;
        }

        let base_secs = self.sweep_interval.as_secs_f64();
        let jitter = rand::random::<f64>() * base_secs * self.sweep_jitter;
        Duration::from_secs_f64(base_secs + jitter)
    }
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
            CacheError::ConfigError(format!("{}: expected an integer ({})", name, e))
        }),
        Err(_) => Ok(None),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct EntityCacheConfigBuilder {
    cache_expiration: Option<Duration>,
    sweep_interval: Option<Duration>,
    sweep_jitter: Option<f64>,
    enable_auto_sweep: Option<bool>,
    lock_poll_interval: Option<Duration>,
}

impl EntityCacheConfigBuilder {
    /// Set the eviction window. Also the sweep interval unless one is set.
    pub fn cache_expiration(mut self, expiration: Duration) -> Self {
        self.cache_expiration = Some(expiration);
        self
    }

    /// Set the delay between automatic sweeps
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set sweep jitter factor (0.0 - 1.0)
    pub fn sweep_jitter(mut self, jitter: f64) -> Self {
        self.sweep_jitter = Some(jitter);
        self
    }

    /// Enable or disable the periodic sweep task
    pub fn enable_auto_sweep(mut self, enable: bool) -> Self {
        self.enable_auto_sweep = Some(enable);
        self
    }

    /// Set the keyed lock retry period
    pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> EntityCacheConfig {
        let defaults = EntityCacheConfig::default();
        let cache_expiration = self.cache_expiration.unwrap_or(defaults.cache_expiration);

        EntityCacheConfig {
            cache_expiration,
            sweep_interval: self.sweep_interval.unwrap_or(cache_expiration),
            sweep_jitter: self.sweep_jitter.unwrap_or(defaults.sweep_jitter),
            enable_auto_sweep: self.enable_auto_sweep.unwrap_or(defaults.enable_auto_sweep),
            lock_poll_interval: self
                .lock_poll_interval
                .unwrap_or(defaults.lock_poll_interval),
        }
    }
}

/// Preset configurations
impl EntityCacheConfig {
    /// Short-lived sessions such as a single restore
    pub fn short_lived() -> Self {
        Self::builder()
            .cache_expiration(Duration::from_secs(60))
            .build()
    }

    /// Long-running hosts that browse many packages
    pub fn long_running() -> Self {
        Self::builder()
            .cache_expiration(Duration::from_secs(30 * 60))
            .sweep_interval(Duration::from_secs(5 * 60))
            .sweep_jitter(0.1)
            .build()
    }

    /// No background task; eviction only through explicit sweeps
    pub fn manual_sweep(cache_expiration: Duration) -> Self {
        Self::builder()
            .cache_expiration(cache_expiration)
            .enable_auto_sweep(false)
            .build()
    }
}
