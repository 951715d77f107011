//! Configuration for slotgrid
//!
//! Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a slotgrid control plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotgridConfig {
    /// Node registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Reaper sweep configuration
    #[serde(default)]
    pub reaper: ReaperConfig,

    /// Event bus configuration
    #[serde(default)]
    pub events: EventBusConfig,
}

impl SlotgridConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.reaper.validate()?;
        self.events.validate()?;
        Ok(())
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| Error::ConfigParseFailed {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }
}

/// Node registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Consecutive failed health checks tolerated before a node is purged
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,

    /// Heartbeat periods of silence before a `DOWN` node is purged
    #[serde(default = "default_purge_timeout_multiplier")]
    pub purge_timeout_multiplier: u32,
}

fn default_unhealthy_threshold() -> u32 {
    NODE_UNHEALTHY_COUNT_THRESHOLD
}

fn default_purge_timeout_multiplier() -> u32 {
    NODE_PURGE_TIMEOUT_MULTIPLIER
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: default_unhealthy_threshold(),
            purge_timeout_multiplier: default_purge_timeout_multiplier(),
        }
    }
}

impl RegistryConfig {
    /// Heartbeat periods of silence before an `UP` node is demoted
    pub fn lost_timeout_multiplier(&self) -> u32 {
        self.purge_timeout_multiplier / 2
    }

    fn validate(&self) -> Result<()> {
        if self.unhealthy_threshold == 0 {
            return Err(Error::invalid_configuration(
                "registry.unhealthy_threshold",
                "must be at least 1",
            ));
        }

        if self.purge_timeout_multiplier < 2 || self.purge_timeout_multiplier % 2 != 0 {
            return Err(Error::invalid_configuration(
                "registry.purge_timeout_multiplier",
                format!(
                    "{} must be an even number of at least 2",
                    self.purge_timeout_multiplier
                ),
            ));
        }

        Ok(())
    }
}

/// Reaper sweep configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Whether the control plane runs the reaper at all
    #[serde(default = "default_reaper_enabled")]
    pub enabled: bool,

    /// Interval between sweeps (milliseconds)
    #[serde(default = "default_reaper_interval_ms")]
    pub interval_ms: u64,
}

fn default_reaper_enabled() -> bool {
    true
}

fn default_reaper_interval_ms() -> u64 {
    REAPER_INTERVAL_MS_DEFAULT
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: default_reaper_enabled(),
            interval_ms: default_reaper_interval_ms(),
        }
    }
}

impl ReaperConfig {
    /// Create an enabled reaper configuration with the given interval
    pub fn with_interval_ms(interval_ms: u64) -> Self {
        Self {
            enabled: true,
            interval_ms,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(REAPER_INTERVAL_MS_MIN..=REAPER_INTERVAL_MS_MAX).contains(&self.interval_ms) {
            return Err(Error::invalid_configuration(
                "reaper.interval_ms",
                format!(
                    "{} outside [{}, {}]",
                    self.interval_ms, REAPER_INTERVAL_MS_MIN, REAPER_INTERVAL_MS_MAX
                ),
            ));
        }
        Ok(())
    }
}

/// Event bus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Buffered events per subscriber before slow receivers lag
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    EVENT_BUS_CAPACITY_COUNT_DEFAULT
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl EventBusConfig {
    fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.capacity > EVENT_BUS_CAPACITY_COUNT_MAX {
            return Err(Error::invalid_configuration(
                "events.capacity",
                format!(
                    "{} outside [1, {}]",
                    self.capacity, EVENT_BUS_CAPACITY_COUNT_MAX
                ),
            ));
        }
        Ok(())
    }
}
