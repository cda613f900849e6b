// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Baton coordination core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use baton_core::BudgetPeriod;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level Baton configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatonConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Message bus delivery settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Cost ledger and budget settings.
    #[serde(default)]
    pub cost: CostConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a writer waits for the SQLite write lock before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("baton").join("baton.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("baton.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Message bus delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Seconds a delivered message may stay unacknowledged before redelivery.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Nacks tolerated before a message is moved to the failed state.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Lowest accepted priority.
    #[serde(default = "default_min_priority")]
    pub min_priority: i32,

    /// Highest accepted priority.
    #[serde(default = "default_max_priority")]
    pub max_priority: i32,

    /// Interval of the visibility timeout reaper.
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,

    /// Interval at which idle subscribers re-check the store for messages
    /// written by other processes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Reserved topic the cost ledger publishes budget alerts to.
    #[serde(default = "default_alert_topic")]
    pub alert_topic: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_retries: default_max_retries(),
            min_priority: default_min_priority(),
            max_priority: default_max_priority(),
            reap_interval_ms: default_reap_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            alert_topic: default_alert_topic(),
        }
    }
}

impl BusConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_visibility_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_priority() -> i32 {
    0
}

fn default_max_priority() -> i32 {
    10
}

fn default_reap_interval_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_alert_topic() -> String {
    "budget.alerts".to_string()
}

/// Cost ledger and budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    /// Budget ceiling in USD for one period. `None` disables alerting.
    #[serde(default)]
    pub budget_limit_usd: Option<Decimal>,

    /// Percentages of the limit that raise an alert when reached.
    #[serde(default = "default_alert_thresholds_pct")]
    pub alert_thresholds_pct: Vec<u32>,

    /// Window the limit applies to.
    #[serde(default)]
    pub budget_period: BudgetPeriod,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            budget_limit_usd: None,
            alert_thresholds_pct: default_alert_thresholds_pct(),
            budget_period: BudgetPeriod::default(),
        }
    }
}

fn default_alert_thresholds_pct() -> Vec<u32> {
    vec![80, 90, 100]
}
