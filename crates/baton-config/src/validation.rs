// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, ordered priority bounds, and positive budgets.

use rust_decimal::Decimal;

use crate::diagnostic::ConfigError;
use crate::model::BatonConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BatonConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    if config.bus.visibility_timeout_secs == 0 {
        invalid("bus.visibility_timeout_secs must be at least 1".to_string());
    }

    if config.bus.reap_interval_ms == 0 {
        invalid("bus.reap_interval_ms must be at least 1".to_string());
    }

    if config.bus.poll_interval_ms == 0 {
        invalid("bus.poll_interval_ms must be at least 1".to_string());
    }

    if config.bus.min_priority > config.bus.max_priority {
        invalid(format!(
            "bus.min_priority ({}) must not exceed bus.max_priority ({})",
            config.bus.min_priority, config.bus.max_priority
        ));
    }

    if config.bus.alert_topic.trim().is_empty() {
        invalid("bus.alert_topic must not be empty".to_string());
    }

    if let Some(limit) = config.cost.budget_limit_usd
        && limit <= Decimal::ZERO
    {
        invalid(format!("cost.budget_limit_usd must be positive, got {limit}"));
    }

    if config.cost.alert_thresholds_pct.is_empty() {
        invalid("cost.alert_thresholds_pct must list at least one threshold".to_string());
    }

    if config.cost.alert_thresholds_pct.contains(&0) {
        invalid("cost.alert_thresholds_pct entries must be greater than 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
