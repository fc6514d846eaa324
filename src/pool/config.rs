use crate::error::ConfigError;
use std::time::Duration;

/// Sizing and timing of one connector pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum instances checked out at once.
    pub max_objects: usize,
    /// Maximum idle instances retained.
    pub max_idle: usize,
    /// Idle instances kept by eviction regardless of age.
    pub min_idle: usize,
    /// How long a checkout waits before failing with pool exhaustion.
    pub max_wait: Duration,
    /// Idle time after which an instance becomes eligible for eviction.
    pub min_evictable_idle: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_objects: 10,
            max_idle: 10,
            min_idle: 1,
            max_wait: Duration::from_secs(150),
            min_evictable_idle: Duration::from_secs(120),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_objects == 0 {
            return Err(ConfigError::Validation(
                "pool maxObjects must be greater than 0".into(),
            ));
        }
        if self.min_idle > self.max_idle {
            return Err(ConfigError::Validation(format!(
                "pool minIdle ({}) must not exceed maxIdle ({})",
                self.min_idle, self.max_idle
            )));
        }
        if self.max_idle > self.max_objects {
            return Err(ConfigError::Validation(format!(
                "pool maxIdle ({}) must not exceed maxObjects ({})",
                self.max_idle, self.max_objects
            )));
        }
        Ok(())
    }
}
