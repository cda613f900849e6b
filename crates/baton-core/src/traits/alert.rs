// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert sink trait connecting the cost ledger to a delivery channel.

use async_trait::async_trait;

use crate::error::BusError;
use crate::types::BudgetAlert;

/// Destination for budget threshold alerts.
///
/// The message bus implements this by publishing onto its reserved alert
/// topic. The ledger only depends on this trait, never on the bus crate.
#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    /// Deliver one alert. A returned error means the alert was not delivered.
    async fn send_alert(&self, alert: &BudgetAlert) -> Result<(), BusError>;
}
