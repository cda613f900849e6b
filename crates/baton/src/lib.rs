// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Baton: a durable priority message bus with a built-in cost ledger.
//!
//! [`Coordinator`] opens both halves over one SQLite file. Budget threshold
//! alerts from the ledger are published on the bus alert topic so any
//! subscriber can react to overspend.

pub mod coordinator;
pub mod error;
pub mod telemetry;

pub use baton_bus::{MessageBus, Subscription, TypedTopic};
pub use baton_config::BatonConfig;
pub use baton_core::{
    BudgetAlert, BudgetPeriod, CostRecord, HealthStatus, Message, MessageId, MessageStatus,
};
pub use baton_cost::{CostLedger, CostRecordFilter, CostSummary};
pub use coordinator::Coordinator;
pub use error::BatonError;
