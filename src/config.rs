// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! # Configuration
//!
//! Layered configuration for the engine: defaults, optional TOML file,
//! environment overrides. All durations are in seconds.
//!
//! Environment overrides (highest precedence):
//! - `RESILIENCE_CHECKPOINT_PATH`
//! - `RESILIENCE_MAX_CONCURRENT_SCANS`
//! - `RESILIENCE_COPY_THREADS`

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ResilienceError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Pool scan scheduling.
    pub pools: PoolOpConfig,
    /// File operation scheduling and retry budget.
    pub files: FileOpConfig,
    /// Crash-recovery checkpointing.
    pub checkpoint: CheckpointConfig,
}

/// Pool-operation scheduling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOpConfig {
    /// Delay before acting on a DOWN transition, in seconds.
    pub down_grace_period: u64,
    /// Delay before acting on a DOWN -> ENABLED transition, in seconds.
    pub restart_grace_period: u64,
    /// A pool idle longer than this is rescanned by the watchdog, in seconds.
    pub rescan_window: u64,
    /// Cadence of the watchdog sweep, in seconds.
    pub sweep_interval: u64,
    /// Maximum number of concurrently running pool scans.
    pub max_concurrent_scans: usize,
}

impl Default for PoolOpConfig {
    fn default() -> Self {
        Self {
            down_grace_period: 3600,
            restart_grace_period: 1800,
            rescan_window: 24 * 3600,
            sweep_interval: 120,
            max_concurrent_scans: 5,
        }
    }
}

/// File-operation scheduling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOpConfig {
    /// Upper bound on concurrently running file operations ("copy threads").
    pub copy_threads: usize,
    /// Retries of the same source/target pair before escalating.
    pub max_retries: u32,
    /// Cadence of the consumer sweep, in seconds.
    pub sweep_interval: u64,
    /// Maximum share of running slots either the foreground or the
    /// background queue may claim, in percent (50..=100).
    pub max_allocation: u8,
}

impl Default for FileOpConfig {
    fn default() -> Self {
        Self {
            copy_threads: 200,
            max_retries: 2,
            sweep_interval: 60,
            max_allocation: 80,
        }
    }
}

/// Checkpointing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Whether the periodic checkpointer runs at all.
    pub enabled: bool,
    /// Seconds between checkpoint writes.
    pub interval: u64,
    /// Path of the checkpoint file. The excluded-pools sidecar lives next
    /// to it with an `.excluded` suffix.
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 600,
            path: PathBuf::from("resilience.ckpt"),
        }
    }
}

impl ResilienceConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| ResilienceError::InvalidConfiguration {
            field: "config file".to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
        let mut config: ResilienceConfig =
            toml::from_str(&raw).map_err(|e| ResilienceError::InvalidConfiguration {
                field: "config file".to_string(),
                reason: e.to_string(),
            })?;
        config.apply_env_overrides();
        config.validate()?;
        info!("loaded resilience configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var("RESILIENCE_CHECKPOINT_PATH") {
            self.checkpoint.path = PathBuf::from(path);
        }
        if let Ok(n) = env::var("RESILIENCE_MAX_CONCURRENT_SCANS") {
            if let Ok(n) = n.parse() {
                self.pools.max_concurrent_scans = n;
            }
        }
        if let Ok(n) = env::var("RESILIENCE_COPY_THREADS") {
            if let Ok(n) = n.parse() {
                self.files.copy_threads = n;
            }
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pools.max_concurrent_scans == 0 {
            return Err(ResilienceError::InvalidConfiguration {
                field: "pools.max_concurrent_scans".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.files.copy_threads == 0 {
            return Err(ResilienceError::InvalidConfiguration {
                field: "files.copy_threads".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(50..=100).contains(&self.files.max_allocation) {
            return Err(ResilienceError::InvalidConfiguration {
                field: "files.max_allocation".to_string(),
                reason: "must be between 50 and 100 percent".to_string(),
            });
        }
        if self.pools.sweep_interval == 0 || self.files.sweep_interval == 0 {
            return Err(ResilienceError::InvalidConfiguration {
                field: "sweep_interval".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.checkpoint.enabled && self.checkpoint.interval == 0 {
            return Err(ResilienceError::InvalidConfiguration {
                field: "checkpoint.interval".to_string(),
                reason: "must be non-zero when checkpointing is enabled".to_string(),
            });
        }
        Ok(())
    }

    pub fn down_grace(&self) -> Duration {
        Duration::from_secs(self.pools.down_grace_period)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_secs(self.pools.restart_grace_period)
    }

    pub fn rescan_window(&self) -> Duration {
        Duration::from_secs(self.pools.rescan_window)
    }

    pub fn pool_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pools.sweep_interval)
    }

    pub fn file_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.files.sweep_interval)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint.interval)
    }

    /// Sidecar file recording admin-excluded pools.
    pub fn excluded_pools_path(&self) -> PathBuf {
        let mut path = self.checkpoint.path.clone();
        let mut name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resilience.ckpt".to_string());
        name.push_str(".excluded");
        path.set_file_name(name);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ResilienceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.files.copy_threads, 200);
        assert_eq!(config.files.max_retries, 2);
    }

    #[test]
    fn rejects_zero_copy_threads() {
        let mut config = ResilienceConfig::default();
        config.files.copy_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_allocation() {
        let mut config = ResilienceConfig::default();
        config.files.max_allocation = 40;
        assert!(config.validate().is_err());
        config.files.max_allocation = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn excluded_sidecar_sits_next_to_checkpoint() {
        let mut config = ResilienceConfig::default();
        config.checkpoint.path = PathBuf::from("/var/lib/resilience/ops.ckpt");
        assert_eq!(
            config.excluded_pools_path(),
            PathBuf::from("/var/lib/resilience/ops.ckpt.excluded")
        );
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [files]
            copy_threads = 16
            max_retries = 5
        "#;
        let config: ResilienceConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.files.copy_threads, 16);
        assert_eq!(config.files.max_retries, 5);
        // untouched sections keep their defaults
        assert_eq!(config.pools.max_concurrent_scans, 5);
    }
}
