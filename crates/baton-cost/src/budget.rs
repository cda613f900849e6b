// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budgets with percentage alert thresholds.
//!
//! A budget never blocks spending; it only reports crossings, each at most
//! once per period. The period total and the thresholds already announced
//! are kept in the store, so every ledger sharing a database file agrees on
//! both and a restart does not re-announce anything.

use baton_config::model::CostConfig;
use baton_core::{BudgetAlert, BudgetPeriod, LedgerError, budget_percent};
use baton_storage::models::{BudgetWindow, MeteredAppend};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

/// A validated spending limit and its alert thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Budget {
    limit_usd: Decimal,
    /// Sorted ascending, no duplicates.
    thresholds_pct: Vec<u32>,
}

impl Budget {
    /// Validate and normalize a budget.
    pub fn new(limit_usd: Decimal, thresholds_pct: &[u32]) -> Result<Self, LedgerError> {
        if limit_usd <= Decimal::ZERO {
            return Err(LedgerError::InvalidBudget(format!(
                "limit must be positive, got {limit_usd}"
            )));
        }
        if thresholds_pct.is_empty() {
            return Err(LedgerError::InvalidBudget(
                "at least one alert threshold is required".to_string(),
            ));
        }
        if thresholds_pct.contains(&0) {
            return Err(LedgerError::InvalidBudget(
                "alert thresholds must be greater than 0".to_string(),
            ));
        }
        let mut thresholds_pct = thresholds_pct.to_vec();
        thresholds_pct.sort_unstable();
        thresholds_pct.dedup();
        Ok(Self {
            limit_usd,
            thresholds_pct,
        })
    }

    /// Budget described by the `[cost]` config section, if a limit is set.
    pub fn from_config(config: &CostConfig) -> Result<Option<Self>, LedgerError> {
        config
            .budget_limit_usd
            .map(|limit| Self::new(limit, &config.alert_thresholds_pct))
            .transpose()
    }

    pub fn limit_usd(&self) -> Decimal {
        self.limit_usd
    }

    pub fn thresholds_pct(&self) -> &[u32] {
        &self.thresholds_pct
    }
}

/// Snapshot of the budget state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    /// `None` when no budget is configured.
    pub limit_usd: Option<Decimal>,
    pub thresholds_pct: Vec<u32>,
    pub running_total: Decimal,
    /// `None` when no budget is configured.
    pub percent_used: Option<Decimal>,
    pub period: BudgetPeriod,
    pub period_label: String,
    pub fired_thresholds: Vec<u32>,
}

/// The budget in force and the period it applies to.
///
/// Totals and fired thresholds live in the store, where every ledger on the
/// file sees them. This type only turns them into windows, alerts and
/// status snapshots.
#[derive(Debug, Clone)]
pub struct ActiveBudget {
    budget: Option<Budget>,
    period: BudgetPeriod,
}

impl ActiveBudget {
    pub fn new(budget: Option<Budget>, period: BudgetPeriod) -> Self {
        Self { budget, period }
    }

    pub fn budget(&self) -> Option<&Budget> {
        self.budget.as_ref()
    }

    pub fn period(&self) -> BudgetPeriod {
        self.period
    }

    /// Replace the budget.
    pub fn set(&mut self, budget: Budget) {
        self.budget = Some(budget);
    }

    /// Disable alerting. Spend is still recorded and totalled.
    pub fn clear(&mut self) {
        self.budget = None;
    }

    /// The period containing `now` and the limit to check appends against.
    pub fn window(&self, now: DateTime<Utc>) -> BudgetWindow {
        BudgetWindow {
            since: self.period.start(now),
            period_label: self.period.label(now),
            limit_usd: self.budget.as_ref().map(Budget::limit_usd),
            thresholds_pct: self.thresholds().to_vec(),
        }
    }

    /// Percent of the limit `total` represents, `None` without a budget.
    pub fn percent_used(&self, total: Decimal) -> Option<Decimal> {
        let budget = self.budget.as_ref()?;
        Some(budget_percent(total, budget.limit_usd))
    }

    /// One alert per threshold the append claimed.
    pub fn alerts(&self, metered: &MeteredAppend, now: DateTime<Utc>) -> Vec<BudgetAlert> {
        let Some(budget) = &self.budget else {
            return Vec::new();
        };
        let pct = budget_percent(metered.period_total, budget.limit_usd);
        metered
            .claimed
            .iter()
            .map(|&threshold| {
                warn!(
                    threshold,
                    percent_used = %pct.round_dp(2),
                    running_total = %metered.period_total,
                    limit_usd = %budget.limit_usd,
                    period = %self.period,
                    "budget threshold crossed"
                );
                BudgetAlert {
                    threshold,
                    percent_used: pct,
                    running_total: metered.period_total,
                    limit_usd: budget.limit_usd,
                    period: self.period,
                    period_label: self.period.label(now),
                    fired_at: now,
                }
            })
            .collect()
    }

    /// Snapshot from the period total and the claimed thresholds.
    pub fn status(&self, total: Decimal, fired: Vec<u32>, now: DateTime<Utc>) -> BudgetStatus {
        let fired_thresholds = if self.budget.is_some() {
            fired
        } else {
            Vec::new()
        };
        BudgetStatus {
            limit_usd: self.budget.as_ref().map(Budget::limit_usd),
            thresholds_pct: self.thresholds().to_vec(),
            running_total: total,
            percent_used: self.percent_used(total),
            period: self.period,
            period_label: self.period.label(now),
            fired_thresholds,
        }
    }

    fn thresholds(&self) -> &[u32] {
        self.budget
            .as_ref()
            .map(Budget::thresholds_pct)
            .unwrap_or_default()
    }
}
