// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Baton coordination core.
//!
//! This crate provides the shared identifiers, message and cost record types,
//! the error taxonomy, and the trait seams used throughout the Baton
//! workspace. The store, bus, and ledger crates all build on it.

pub mod error;
pub mod recording;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{BusError, LedgerError, StoreError};
pub use types::{
    BudgetAlert, BudgetPeriod, CostRecord, HealthStatus, Message, MessageId, MessageStatus,
    NewCostRecord, NewMessage, RecordId, TransitionCheck, budget_percent,
};

pub use traits::{AlertSink, Component};
