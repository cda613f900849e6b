// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost ledger for persisting metered operations to SQLite.
//!
//! Each metered call is appended with its token counts and exact decimal
//! cost. The append, the period total and the threshold claims happen in one
//! immediate transaction, so ledgers in different processes sharing the
//! file agree on the total and never announce a threshold twice.

use std::sync::Arc;

use async_trait::async_trait;
use baton_config::model::{CostConfig, StorageConfig};
use baton_core::recording;
use baton_core::{
    AlertSink, BudgetAlert, Component, CostRecord, HealthStatus, LedgerError, NewCostRecord,
    StoreError, budget_percent,
};
use baton_storage::Database;
use baton_storage::models::CostRecordFilter;
use baton_storage::queries::{budget_alerts, cost_records};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::budget::{ActiveBudget, Budget, BudgetStatus};
use crate::summary::CostSummary;

/// Largest cost a single record may carry, in USD.
pub const MAX_RECORD_COST_USD: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Persistent cost ledger backed by SQLite.
///
/// Records go to the append-only `cost_records` table. Alerts are handed to
/// the optional [`AlertSink`]; without one they are only logged.
pub struct CostLedger {
    db: Database,
    budget: Mutex<ActiveBudget>,
    sink: Option<Arc<dyn AlertSink>>,
}

impl CostLedger {
    /// Open the ledger on the database described by `storage`.
    pub async fn open(
        storage: &StorageConfig,
        config: &CostConfig,
        sink: Option<Arc<dyn AlertSink>>,
    ) -> Result<Self, LedgerError> {
        let db = Database::open_with(storage).await?;
        Self::with_database(db, config, sink).await
    }

    /// Create a ledger over an open database.
    pub async fn with_database(
        db: Database,
        config: &CostConfig,
        sink: Option<Arc<dyn AlertSink>>,
    ) -> Result<Self, LedgerError> {
        let budget = ActiveBudget::new(Budget::from_config(config)?, config.budget_period);
        let window = budget.window(Utc::now());
        let total = cost_records::period_total(&db, window.since).await?;
        let fired = budget_alerts::fired(&db, &window.period_label).await?;

        info!(
            period = %window.period_label,
            running_total = %total,
            fired = ?fired,
            "cost ledger opened"
        );
        Ok(Self {
            db,
            budget: Mutex::new(budget),
            sink,
        })
    }

    /// Record one metered operation.
    ///
    /// Fails only on invalid input or a storage failure. Exceeding the budget
    /// never blocks recording.
    pub async fn record(
        &self,
        agent: &str,
        operation: &str,
        cost_usd: Decimal,
        tokens_in: u64,
        tokens_out: u64,
        success: bool,
    ) -> Result<CostRecord, LedgerError> {
        self.record_entry(NewCostRecord::new(
            agent, operation, cost_usd, tokens_in, tokens_out, success,
        ))
        .await
    }

    /// Record a prepared entry, keeping its timestamp.
    ///
    /// Entries stamped before the current period started are stored but do
    /// not count toward its total.
    pub async fn record_entry(&self, entry: NewCostRecord) -> Result<CostRecord, LedgerError> {
        validate(&entry)?;

        let now = Utc::now();
        let budget = self.budget.lock().await.clone();
        let window = budget.window(now);
        let metered = cost_records::append_metered(&self.db, &entry, &window).await?;
        let stored = &metered.record;
        recording::record_cost(&stored.agent, stored.cost_usd);
        info!(
            agent = %stored.agent,
            operation = %stored.operation,
            cost_usd = %stored.cost_usd,
            tokens_in = stored.tokens_in,
            tokens_out = stored.tokens_out,
            success = stored.success,
            "cost recorded"
        );

        if let Some(limit) = window.limit_usd {
            recording::set_budget_used_pct(budget_percent(metered.period_total, limit));
        }
        for alert in budget.alerts(&metered, now) {
            self.emit(alert).await;
        }
        Ok(metered.record)
    }

    /// Deliver one alert. A failed delivery drops the threshold's claim so
    /// the next record retries it.
    async fn emit(&self, alert: BudgetAlert) {
        let Some(sink) = &self.sink else {
            emitted(&alert);
            return;
        };
        match sink.send_alert(&alert).await {
            Ok(()) => emitted(&alert),
            Err(e) => {
                error!(
                    threshold = alert.threshold,
                    error = %e,
                    "budget alert delivery failed, will retry on next record"
                );
                if let Err(e) =
                    budget_alerts::release(&self.db, &alert.period_label, alert.threshold).await
                {
                    error!(
                        threshold = alert.threshold,
                        error = %e,
                        "could not re-arm budget threshold"
                    );
                }
            }
        }
    }

    /// Stored records matching `filter`, oldest first.
    pub async fn records(&self, filter: &CostRecordFilter) -> Result<Vec<CostRecord>, LedgerError> {
        Ok(cost_records::query(&self.db, filter).await?)
    }

    /// Aggregate the records matching `filter`.
    pub async fn summary(&self, filter: &CostRecordFilter) -> Result<CostSummary, LedgerError> {
        let records = self.records(filter).await?;
        CostSummary::from_records(&records)
    }

    /// Replace the budget. The thresholds of the current period are re-armed
    /// and evaluated again on the next record.
    pub async fn set_budget(
        &self,
        limit_usd: Decimal,
        alert_thresholds_pct: &[u32],
    ) -> Result<(), LedgerError> {
        let budget = Budget::new(limit_usd, alert_thresholds_pct)?;
        info!(
            limit_usd = %budget.limit_usd(),
            thresholds = ?budget.thresholds_pct(),
            "budget updated"
        );
        let mut active = self.budget.lock().await;
        let label = active.period().label(Utc::now());
        budget_alerts::clear(&self.db, &label).await?;
        active.set(budget);
        Ok(())
    }

    /// Disable budget alerting.
    pub async fn clear_budget(&self) {
        self.budget.lock().await.clear();
        info!("budget cleared");
    }

    /// Budget, period total and announced thresholds, read from the store.
    pub async fn budget_status(&self) -> Result<BudgetStatus, LedgerError> {
        let budget = self.budget.lock().await.clone();
        let now = Utc::now();
        let window = budget.window(now);
        let total = cost_records::period_total(&self.db, window.since).await?;
        let fired = budget_alerts::fired(&self.db, &window.period_label).await?;
        Ok(budget.status(total, fired, now))
    }
}

/// Count an alert once it has left the ledger.
fn emitted(alert: &BudgetAlert) {
    recording::record_budget_alert(alert.threshold);
    info!(
        threshold = alert.threshold,
        period = %alert.period_label,
        "budget alert emitted"
    );
}

fn validate(entry: &NewCostRecord) -> Result<(), LedgerError> {
    if entry.agent.trim().is_empty() {
        return Err(LedgerError::InvalidRecord("agent must not be empty".into()));
    }
    if entry.operation.trim().is_empty() {
        return Err(LedgerError::InvalidRecord("operation must not be empty".into()));
    }
    if entry.cost_usd < Decimal::ZERO {
        return Err(LedgerError::InvalidRecord(format!(
            "cost must not be negative, got {}",
            entry.cost_usd
        )));
    }
    if entry.cost_usd > MAX_RECORD_COST_USD {
        return Err(LedgerError::InvalidRecord(format!(
            "cost must not exceed {MAX_RECORD_COST_USD}, got {}",
            entry.cost_usd
        )));
    }
    Ok(())
}

#[async_trait]
impl Component for CostLedger {
    fn name(&self) -> &str {
        "cost-ledger"
    }

    async fn health_check(&self) -> Result<HealthStatus, StoreError> {
        match self.db.ping().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.db.checkpoint().await
    }
}
