// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregation of stored cost records.

use std::collections::BTreeMap;

use baton_core::{CostRecord, LedgerError};
use rust_decimal::Decimal;
use serde::Serialize;

/// Spend and call count for one agent or operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Breakdown {
    pub cost_usd: Decimal,
    pub calls: u64,
}

/// Aggregates over a set of cost records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CostSummary {
    pub total_cost_usd: Decimal,
    pub call_count: u64,
    pub success_count: u64,
    /// Fraction of successful calls in `[0, 1]`; zero when there are no calls.
    pub success_rate: Decimal,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub by_agent: BTreeMap<String, Breakdown>,
    pub by_operation: BTreeMap<String, Breakdown>,
}

impl Breakdown {
    fn add(&mut self, cost_usd: Decimal) -> Result<(), LedgerError> {
        self.cost_usd = checked_sum(self.cost_usd, cost_usd)?;
        self.calls += 1;
        Ok(())
    }
}

fn checked_sum(a: Decimal, b: Decimal) -> Result<Decimal, LedgerError> {
    a.checked_add(b).ok_or(LedgerError::Overflow)
}

impl CostSummary {
    /// Summarize `records`. The result does not depend on their order.
    ///
    /// Fails with [`LedgerError::Overflow`] if a total leaves the decimal
    /// range.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a CostRecord>,
    ) -> Result<Self, LedgerError> {
        let mut summary = Self::default();
        for record in records {
            summary.total_cost_usd = checked_sum(summary.total_cost_usd, record.cost_usd)?;
            summary.call_count += 1;
            if record.success {
                summary.success_count += 1;
            }
            summary.tokens_in = summary.tokens_in.saturating_add(record.tokens_in);
            summary.tokens_out = summary.tokens_out.saturating_add(record.tokens_out);

            summary
                .by_agent
                .entry(record.agent.clone())
                .or_default()
                .add(record.cost_usd)?;
            summary
                .by_operation
                .entry(record.operation.clone())
                .or_default()
                .add(record.cost_usd)?;
        }
        if summary.call_count > 0 {
            summary.success_rate =
                Decimal::from(summary.success_count) / Decimal::from(summary.call_count);
        }
        Ok(summary)
    }
}
