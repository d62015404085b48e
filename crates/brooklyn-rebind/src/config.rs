// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the management node.

use std::path::PathBuf;
use std::time::Duration;

use brooklyn_tasks::GcConfig;

use crate::exception_handler::{FailureMode, RebindFailureModes};
use crate::manager::RebindMode;

/// Node configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file holding persisted mementos
    pub persistence_path: PathBuf,
    /// High-availability role at startup
    pub ha_mode: RebindMode,
    pub rebind: RebindConfig,
    pub gc: GcConfig,
}

/// Settings for rebind passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebindConfig {
    pub failure_modes: RebindFailureModes,
    /// Fall back to scanning every registered type's libraries when a type
    /// name is not otherwise resolvable.
    pub legacy_catalog_scan: bool,
    /// Interval between read-only rebinds on a standby node.
    pub read_only_period: Duration,
    /// Interval between checkpoints on a master node.
    pub persist_period: Duration,
}

impl Default for RebindConfig {
    fn default() -> Self {
        Self {
            failure_modes: RebindFailureModes::default(),
            legacy_catalog_scan: true,
            read_only_period: Duration::from_secs(5),
            persist_period: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let persistence_path = PathBuf::from(
            std::env::var("BROOKLYN_PERSISTENCE_PATH")
                .unwrap_or_else(|_| ".data/brooklyn.db".to_string()),
        );

        let ha_mode = match std::env::var("BROOKLYN_HA_MODE") {
            Ok(v) => RebindMode::parse(&v).ok_or(ConfigError::Invalid("BROOKLYN_HA_MODE", v))?,
            Err(_) => RebindMode::Master,
        };

        Ok(Self {
            persistence_path,
            ha_mode,
            rebind: RebindConfig::from_env()?,
            gc: GcConfig::from_env()?,
        })
    }
}

impl RebindConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let modes = defaults.failure_modes;

        let failure_modes = RebindFailureModes {
            dangling_ref: mode_var("BROOKLYN_REBIND_FAILURE_MODE_DANGLING", modes.dangling_ref)?,
            load: mode_var("BROOKLYN_REBIND_FAILURE_MODE_LOAD", modes.load)?,
            create: mode_var("BROOKLYN_REBIND_FAILURE_MODE_CREATE", modes.create)?,
            rebind: mode_var("BROOKLYN_REBIND_FAILURE_MODE_REBIND", modes.rebind)?,
            add_adjunct: mode_var("BROOKLYN_REBIND_FAILURE_MODE_ADD_ADJUNCT", modes.add_adjunct)?,
            manage: mode_var("BROOKLYN_REBIND_FAILURE_MODE_MANAGE", modes.manage)?,
            not_found: mode_var("BROOKLYN_REBIND_FAILURE_MODE_NOT_FOUND", modes.not_found)?,
        };

        let legacy_catalog_scan = std::env::var("BROOKLYN_REBIND_LEGACY_CATALOG_SCAN")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.legacy_catalog_scan);

        Ok(Self {
            failure_modes,
            legacy_catalog_scan,
            read_only_period: secs_var(
                "BROOKLYN_READ_ONLY_REBIND_PERIOD_SECS",
                defaults.read_only_period,
            )?,
            persist_period: secs_var("BROOKLYN_PERSIST_PERIOD_SECS", defaults.persist_period)?,
        })
    }
}

fn mode_var(key: &'static str, default: FailureMode) -> Result<FailureMode, ConfigError> {
    match std::env::var(key) {
        Ok(v) => FailureMode::parse(&v).ok_or(ConfigError::Invalid(key, v)),
        Err(_) => Ok(default),
    }
}

fn secs_var(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid(key, v)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has a value that cannot be parsed.
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
    /// Garbage collector settings are invalid.
    #[error(transparent)]
    Gc(#[from] brooklyn_tasks::ConfigError),
}
