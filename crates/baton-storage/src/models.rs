// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical record types are defined in `baton-core::types` for use
//! across component boundaries. This module re-exports them and adds the
//! query-side types that only the store needs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub use baton_core::types::{
    CostRecord, Message, MessageId, MessageStatus, NewCostRecord, NewMessage, RecordId,
};

/// Ordering for message queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageOrder {
    /// Delivery order: priority descending, then id ascending.
    #[default]
    PriorityThenId,
    /// Insertion order.
    Id,
}

/// Filter for message queries. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub topic: Option<String>,
    pub statuses: Vec<MessageStatus>,
    pub limit: Option<i64>,
}

impl MessageFilter {
    /// Messages of one topic.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::default()
        }
    }

    /// Restrict to the given statuses.
    pub fn with_statuses(mut self, statuses: &[MessageStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Cap the number of returned rows.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter for cost record queries. Time bounds are `since <= t < until`.
#[derive(Debug, Clone, Default)]
pub struct CostRecordFilter {
    pub agent: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Budget period and limit a metered append is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetWindow {
    /// Start of the period, `None` for lifetime budgets.
    pub since: Option<DateTime<Utc>>,
    /// Key under which fired thresholds are stored, e.g. `2026-03`.
    pub period_label: String,
    /// `None` when no budget is set. The period total is still computed.
    pub limit_usd: Option<Decimal>,
    /// Ascending percentages.
    pub thresholds_pct: Vec<u32>,
}

/// Outcome of appending a cost record against a budget.
#[derive(Debug, Clone, PartialEq)]
pub struct MeteredAppend {
    pub record: CostRecord,
    /// Spend in the period after the append, across every writer.
    pub period_total: Decimal,
    /// Thresholds this append claimed, ascending. No other writer claims
    /// them again for the same period.
    pub claimed: Vec<u32>,
}

/// Result of a compare-and-set status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The status changed.
    Applied,
    /// The record was already in the requested terminal status.
    Unchanged,
}

/// A delivered message returned to the queue by a nack or an expired
/// visibility timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedMessage {
    pub id: MessageId,
    pub topic: String,
    /// `Pending` when requeued, `Failed` when retries ran out.
    pub status: MessageStatus,
    pub retry_count: u32,
}

/// Message counts per status for one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub counts: HashMap<MessageStatus, u64>,
}

impl StatusCounts {
    /// Count for one status, zero when absent.
    pub fn get(&self, status: MessageStatus) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Total across all statuses.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}
