// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` opens a complete [`Coordinator`] over a temp SQLite
//! database. Reaper and poll intervals are shortened so visibility timeouts
//! and cross-handle wake-ups resolve within a test's patience.

use baton::{BatonError, Coordinator};
use baton_config::BatonConfig;
use baton_core::{BudgetPeriod, StoreError};
use rust_decimal::Decimal;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: BatonConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = BatonConfig::default();
        config.bus.reap_interval_ms = 50;
        config.bus.poll_interval_ms = 25;
        Self { config }
    }

    /// Set a budget ceiling for the test environment.
    pub fn with_budget(mut self, limit_usd: Decimal) -> Self {
        self.config.cost.budget_limit_usd = Some(limit_usd);
        self
    }

    pub fn with_thresholds(mut self, thresholds_pct: &[u32]) -> Self {
        self.config.cost.alert_thresholds_pct = thresholds_pct.to_vec();
        self
    }

    pub fn with_budget_period(mut self, period: BudgetPeriod) -> Self {
        self.config.cost.budget_period = period;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.bus.max_retries = max_retries;
        self
    }

    pub fn with_visibility_timeout_secs(mut self, secs: u64) -> Self {
        self.config.bus.visibility_timeout_secs = secs;
        self
    }

    /// Apply an arbitrary edit to the configuration before opening.
    pub fn with_config(mut self, edit: impl FnOnce(&mut BatonConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Build the test harness over a fresh temp database.
    pub async fn build(mut self) -> Result<TestHarness, BatonError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| StoreError::Database {
            source: Box::new(e),
        })?;
        self.config.storage.database_path = temp_dir
            .path()
            .join("baton.db")
            .to_string_lossy()
            .into_owned();

        let coordinator = Coordinator::open(&self.config).await?;
        Ok(TestHarness {
            coordinator,
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A coordinator over a temp database that is removed on drop.
pub struct TestHarness {
    /// The coordinator under test.
    pub coordinator: Coordinator,
    /// Configuration the coordinator was opened with.
    pub config: BatonConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Close the coordinator and open a new one over the same database,
    /// simulating a process restart.
    pub async fn reopen(self) -> Result<Self, BatonError> {
        let TestHarness {
            coordinator,
            config,
            _temp_dir,
        } = self;
        coordinator.close().await?;
        tracing::debug!(database = %config.storage.database_path, "reopening harness");
        let coordinator = Coordinator::open(&config).await?;
        Ok(Self {
            coordinator,
            config,
            _temp_dir,
        })
    }
}
