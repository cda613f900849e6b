// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost tracking and budget alerting for the Baton coordination core.
//!
//! This crate provides:
//! - **Cost ledger**: append-only record of every metered operation with its
//!   token counts and exact decimal cost
//! - **Budgets**: percentage threshold alerts per budget period, announced
//!   at most once across every ledger sharing the database
//! - **Summaries**: totals, success rate and per-agent/per-operation
//!   breakdowns computed from the stored records

pub mod budget;
pub mod ledger;
pub mod summary;

pub use baton_storage::models::CostRecordFilter;
pub use budget::{ActiveBudget, Budget, BudgetStatus};
pub use ledger::{CostLedger, MAX_RECORD_COST_USD};
pub use summary::{Breakdown, CostSummary};
