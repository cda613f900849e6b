// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the store, the message bus, and the cost ledger.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Store-assigned message identifier. Monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned cost record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

/// Health status reported by component health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Component is fully operational.
    Healthy,
    /// Component is operational but experiencing issues.
    Degraded(String),
    /// Component is not operational.
    Unhealthy(String),
}

/// Lifecycle status of a message.
///
/// The string forms are what the store persists in the `status` column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Waiting for a consumer.
    Pending,
    /// Handed to a consumer, awaiting ack or nack.
    Delivered,
    /// Processed successfully. Terminal.
    Acked,
    /// Retries exhausted. Terminal, kept for inspection.
    Failed,
}

/// Outcome of checking a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    /// The transition changes the message.
    Allowed,
    /// The message is already in the target terminal status.
    Unchanged,
    /// The transition is not part of the lifecycle.
    Rejected,
}

impl MessageStatus {
    /// Check whether `self -> to` is a valid lifecycle step.
    pub fn check_transition(self, to: MessageStatus) -> TransitionCheck {
        use MessageStatus::*;
        match (self, to) {
            (Pending, Delivered)
            | (Delivered, Acked)
            | (Delivered, Pending)
            | (Delivered, Failed) => TransitionCheck::Allowed,
            (Acked, Acked) | (Failed, Failed) => TransitionCheck::Unchanged,
            _ => TransitionCheck::Rejected,
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Acked | MessageStatus::Failed)
    }
}

/// A message as stored on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    /// Higher is more urgent.
    pub priority: i32,
    /// Opaque to the bus.
    pub payload: serde_json::Value,
    /// Schema tag set by typed topics.
    pub schema: Option<String>,
    pub status: MessageStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub acked_at: Option<DateTime<Utc>>,
    /// Deadline of the current delivery, if delivered.
    pub visible_until: Option<DateTime<Utc>>,
    /// Number of times the message was handed to a consumer. Identifies the
    /// current delivery when acking or nacking.
    pub delivery_count: u32,
}

/// Input for appending a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub topic: String,
    pub priority: i32,
    pub payload: serde_json::Value,
    pub schema: Option<String>,
}

/// A single metered operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub id: RecordId,
    /// Identifier of the agent that incurred the cost.
    pub agent: String,
    /// Label of the metered action, e.g. a model-call type.
    pub operation: String,
    pub cost_usd: Decimal,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a cost record.
#[derive(Debug, Clone)]
pub struct NewCostRecord {
    pub agent: String,
    pub operation: String,
    pub cost_usd: Decimal,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

impl NewCostRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        agent: impl Into<String>,
        operation: impl Into<String>,
        cost_usd: Decimal,
        tokens_in: u64,
        tokens_out: u64,
        success: bool,
    ) -> Self {
        Self {
            agent: agent.into(),
            operation: operation.into(),
            cost_usd,
            tokens_in,
            tokens_out,
            success,
            created_at: Utc::now(),
        }
    }
}

/// Window over which a budget limit applies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    /// Never resets.
    Lifetime,
    /// Resets at midnight UTC.
    Daily,
    /// Resets on the first of each month, UTC.
    #[default]
    Monthly,
}

impl BudgetPeriod {
    /// Start of the period containing `now`. `None` for lifetime budgets.
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            BudgetPeriod::Lifetime => None,
            BudgetPeriod::Daily => Utc
                .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
                .single(),
            BudgetPeriod::Monthly => Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .single(),
        }
    }

    /// Human-readable label of the period containing `now`.
    pub fn label(self, now: DateTime<Utc>) -> String {
        match self {
            BudgetPeriod::Lifetime => "lifetime".to_string(),
            BudgetPeriod::Daily => now.format("%Y-%m-%d").to_string(),
            BudgetPeriod::Monthly => now.format("%Y-%m").to_string(),
        }
    }
}

/// `total` as a percentage of `limit`, saturating at [`Decimal::MAX`].
///
/// `limit` must be positive.
pub fn budget_percent(total: Decimal, limit: Decimal) -> Decimal {
    total
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(limit))
        .unwrap_or(Decimal::MAX)
}

/// Alert emitted once per threshold per budget period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    /// The threshold that was crossed, in percent.
    pub threshold: u32,
    pub percent_used: Decimal,
    pub running_total: Decimal,
    pub limit_usd: Decimal,
    pub period: BudgetPeriod,
    pub period_label: String,
    pub fired_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_strings_match_store_column() {
        assert_eq!(MessageStatus::Pending.to_string(), "pending");
        assert_eq!(MessageStatus::Delivered.to_string(), "delivered");
        assert_eq!(
            MessageStatus::from_str("acked").unwrap(),
            MessageStatus::Acked
        );
        assert_eq!(
            serde_json::to_string(&MessageStatus::Failed).unwrap(),
            "\"failed\""
        );
    }

    #[test]
    fn lifecycle_transitions() {
        use MessageStatus::*;
        assert_eq!(Pending.check_transition(Delivered), TransitionCheck::Allowed);
        assert_eq!(Delivered.check_transition(Acked), TransitionCheck::Allowed);
        assert_eq!(Delivered.check_transition(Pending), TransitionCheck::Allowed);
        assert_eq!(Delivered.check_transition(Failed), TransitionCheck::Allowed);
        assert_eq!(Acked.check_transition(Acked), TransitionCheck::Unchanged);
        assert_eq!(Failed.check_transition(Failed), TransitionCheck::Unchanged);
        assert_eq!(Pending.check_transition(Acked), TransitionCheck::Rejected);
        assert_eq!(Acked.check_transition(Pending), TransitionCheck::Rejected);
        assert_eq!(Failed.check_transition(Pending), TransitionCheck::Rejected);
    }

    #[test]
    fn budget_percent_saturates() {
        use rust_decimal_macros::dec;
        assert_eq!(budget_percent(dec!(8), dec!(10)), dec!(80));
        assert_eq!(budget_percent(Decimal::MAX, dec!(0.5)), Decimal::MAX);
    }

    #[test]
    fn terminal_statuses() {
        assert!(MessageStatus::Acked.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
        assert!(!MessageStatus::Delivered.is_terminal());
    }

    #[test]
    fn budget_period_boundaries() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 13, 45, 10).unwrap();
        assert_eq!(BudgetPeriod::Lifetime.start(now), None);
        assert_eq!(
            BudgetPeriod::Daily.start(now),
            Some(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(
            BudgetPeriod::Monthly.start(now),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(BudgetPeriod::Daily.label(now), "2026-03-15");
        assert_eq!(BudgetPeriod::Monthly.label(now), "2026-03");
    }

    #[test]
    fn budget_period_parses_from_config_strings() {
        assert_eq!(BudgetPeriod::from_str("daily").unwrap(), BudgetPeriod::Daily);
        assert_eq!(BudgetPeriod::default(), BudgetPeriod::Monthly);
    }
}
