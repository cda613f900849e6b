// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget alerts delivered over the bus.

use async_trait::async_trait;
use baton_core::{AlertSink, BudgetAlert, BusError};
use tracing::info;

use crate::bus::MessageBus;
use crate::typed::TypedTopic;

/// Schema tag of budget alert messages.
pub const BUDGET_ALERT_SCHEMA: &str = "budget.alert/v1";

impl MessageBus {
    /// The reserved topic budget alerts are published to.
    pub fn alert_topic(&self) -> TypedTopic<BudgetAlert> {
        TypedTopic::new(self.config().alert_topic.clone(), BUDGET_ALERT_SCHEMA)
    }
}

#[async_trait]
impl AlertSink for MessageBus {
    /// Publish the alert at the highest configured priority.
    async fn send_alert(&self, alert: &BudgetAlert) -> Result<(), BusError> {
        let topic = self.alert_topic();
        let id = topic
            .publish(self, alert, self.config().max_priority)
            .await?;
        info!(
            id = %id,
            topic = topic.name(),
            threshold = alert.threshold,
            "budget alert published"
        );
        Ok(())
    }
}
