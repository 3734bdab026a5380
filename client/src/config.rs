//! Client configuration loaded from JSON, with defaults for every field.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared::{
    TerrainType, DEFAULT_BATCH_SIZE, DEFAULT_INPUT_DEBOUNCE_MS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_MOVE_COOLDOWN_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PRIORITY_COUNT,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_STALE_THRESHOLD_MS, GRID_SIZE,
};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the game server, e.g. `http://127.0.0.1:8000`.
    pub server_url: String,
    pub player_id: u32,
    /// Side length of the square world.
    pub grid_size: usize,
    pub batch_size: usize,
    pub priority_count: usize,
    pub poll_interval_ms: u64,
    pub stale_threshold_ms: u64,
    pub move_cooldown_ms: u64,
    pub request_timeout_ms: u64,
    pub max_backoff_ms: u64,
    pub input_debounce_ms: u64,
    pub traversable: Vec<TerrainType>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            player_id: 0,
            grid_size: GRID_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            priority_count: DEFAULT_PRIORITY_COUNT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stale_threshold_ms: DEFAULT_STALE_THRESHOLD_MS,
            move_cooldown_ms: DEFAULT_MOVE_COOLDOWN_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            input_debounce_ms: DEFAULT_INPUT_DEBOUNCE_MS,
            traversable: vec![TerrainType::Grass, TerrainType::Ice, TerrainType::Sand],
        }
    }
}

impl SyncConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size == 0 {
            return Err(ConfigError::Invalid("grid_size must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".into(),
            ));
        }
        if self.max_backoff_ms < self.poll_interval_ms {
            return Err(ConfigError::Invalid(
                "max_backoff_ms must not be below poll_interval_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            batch_size: self.batch_size,
            priority_count: self.priority_count,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stale_threshold: Duration::from_millis(self.stale_threshold_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn move_cooldown(&self) -> Duration {
        Duration::from_millis(self.move_cooldown_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn input_debounce(&self) -> Duration {
        Duration::from_millis(self.input_debounce_ms)
    }
}

/// Tuning for the viewport scheduler, derived from [`SyncConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub priority_count: usize,
    pub poll_interval: Duration,
    pub stale_threshold: Duration,
    pub request_timeout: Duration,
    pub max_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SyncConfig::default().scheduler_config()
    }
}

impl SchedulerConfig {
    /// Delay before the next cycle after `consecutive_failures` failed batches.
    pub fn retry_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.poll_interval;
        }
        let factor = 1u32.checked_shl(consecutive_failures.min(16)).unwrap_or(u32::MAX);
        self.poll_interval
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}
