//! Session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tradelock_core::{CoreError, DriftConfig, Result};
use tradelock_sync::SchedulerConfig;

/// Session controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Countdown driver cadence (ms). Default: 1,000.
    #[serde(default = "default_clock_tick_ms")]
    pub clock_tick_ms: u64,
    /// Delay before the forced reconciliation that confirms a successful
    /// lock action (ms). Default: 1,000.
    #[serde(default = "default_lock_confirm_delay_ms")]
    pub lock_confirm_delay_ms: u64,
    /// Delay before the forced reconciliation that corroborates a push
    /// delta once the session is stable (ms). Default: 500.
    #[serde(default = "default_push_corroboration_delay_ms")]
    pub push_corroboration_delay_ms: u64,
    /// Host command buffer size. Default: 64.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// Drift corrector thresholds.
    #[serde(default)]
    pub drift: DriftConfig,
    /// Poll scheduling thresholds.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_clock_tick_ms() -> u64 {
    1_000
}

fn default_lock_confirm_delay_ms() -> u64 {
    1_000
}

fn default_push_corroboration_delay_ms() -> u64 {
    500
}

fn default_command_buffer() -> usize {
    64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clock_tick_ms: default_clock_tick_ms(),
            lock_confirm_delay_ms: default_lock_confirm_delay_ms(),
            push_corroboration_delay_ms: default_push_corroboration_delay_ms(),
            command_buffer: default_command_buffer(),
            drift: DriftConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.clock_tick_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "clock_tick_ms must be non-zero".to_string(),
            ));
        }
        if self.command_buffer == 0 {
            return Err(CoreError::InvalidConfig(
                "command_buffer must be non-zero".to_string(),
            ));
        }
        self.drift.validate()?;
        self.scheduler.validate()
    }

    pub fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms)
    }

    pub fn lock_confirm_delay(&self) -> Duration {
        Duration::from_millis(self.lock_confirm_delay_ms)
    }

    pub fn push_corroboration_delay(&self) -> Duration {
        Duration::from_millis(self.push_corroboration_delay_ms)
    }
}
