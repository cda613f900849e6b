// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The coordinator handle wiring the bus and the cost ledger together.

use std::sync::Arc;

use baton_bus::{MessageBus, Subscription};
use baton_config::BatonConfig;
use baton_config::validation::validate_config;
use baton_core::recording;
use baton_core::{
    AlertSink, Component, CostRecord, HealthStatus, Message, MessageId, MessageStatus,
};
use baton_cost::{CostLedger, CostRecordFilter, CostSummary};
use rust_decimal::Decimal;
use tracing::{error, info};

use crate::error::BatonError;
use crate::telemetry::init_tracing;

/// Owns one message bus and one cost ledger over the same database.
///
/// Budget alerts raised by the ledger are published on the bus's alert
/// topic. Clone [`bus`](Self::bus) or [`ledger`](Self::ledger) to hand them
/// to producers and consumers.
pub struct Coordinator {
    config: BatonConfig,
    bus: MessageBus,
    ledger: Arc<CostLedger>,
}

impl Coordinator {
    /// Validate `config`, open the store, and start the bus and ledger.
    pub async fn open(config: &BatonConfig) -> Result<Self, BatonError> {
        validate_config(config).map_err(BatonError::Config)?;
        recording::register_metrics();

        let bus = MessageBus::open(&config.storage, config.bus.clone()).await?;
        let sink: Arc<dyn AlertSink> = Arc::new(bus.clone());
        let ledger = CostLedger::open(&config.storage, &config.cost, Some(sink)).await?;

        info!(
            database = %config.storage.database_path,
            alert_topic = %config.bus.alert_topic,
            "coordinator ready"
        );
        Ok(Self {
            config: config.clone(),
            bus,
            ledger: Arc::new(ledger),
        })
    }

    /// Load configuration from the standard locations and environment,
    /// install logging at the configured level, and open.
    pub async fn load() -> Result<Self, BatonError> {
        let config = baton_config::load_and_validate().map_err(BatonError::Config)?;
        init_tracing(&config.log.level);
        Self::open(&config).await
    }

    pub fn config(&self) -> &BatonConfig {
        &self.config
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        priority: i32,
    ) -> Result<MessageId, BatonError> {
        Ok(self.bus.publish(topic, payload, priority).await?)
    }

    pub fn subscribe(&self, topic: &str) -> Result<Subscription, BatonError> {
        Ok(self.bus.subscribe(topic)?)
    }

    pub async fn ack(&self, id: MessageId) -> Result<(), BatonError> {
        Ok(self.bus.ack(id).await?)
    }

    pub async fn nack(&self, id: MessageId) -> Result<MessageStatus, BatonError> {
        Ok(self.bus.nack(id).await?)
    }

    /// Ack a delivered message, failing if it was redelivered since.
    pub async fn ack_delivery(&self, message: &Message) -> Result<(), BatonError> {
        Ok(self.bus.ack_delivery(message).await?)
    }

    pub async fn nack_delivery(&self, message: &Message) -> Result<MessageStatus, BatonError> {
        Ok(self.bus.nack_delivery(message).await?)
    }

    pub async fn record(
        &self,
        agent: &str,
        operation: &str,
        cost_usd: Decimal,
        tokens_in: u64,
        tokens_out: u64,
        success: bool,
    ) -> Result<CostRecord, BatonError> {
        Ok(self
            .ledger
            .record(agent, operation, cost_usd, tokens_in, tokens_out, success)
            .await?)
    }

    pub async fn summary(&self, filter: &CostRecordFilter) -> Result<CostSummary, BatonError> {
        Ok(self.ledger.summary(filter).await?)
    }

    pub async fn set_budget(
        &self,
        limit_usd: Decimal,
        alert_thresholds_pct: &[u32],
    ) -> Result<(), BatonError> {
        Ok(self.ledger.set_budget(limit_usd, alert_thresholds_pct).await?)
    }

    /// Health of every component, by name.
    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let components: [&dyn Component; 2] = [&self.bus, self.ledger.as_ref()];
        let mut report = Vec::with_capacity(components.len());
        for component in components {
            let status = match component.health_check().await {
                Ok(status) => status,
                Err(e) => HealthStatus::Unhealthy(e.to_string()),
            };
            report.push((component.name().to_string(), status));
        }
        report
    }

    /// Stop the ledger and then the bus.
    ///
    /// Every component is shut down even if an earlier one fails; the first
    /// failure is returned.
    pub async fn close(self) -> Result<(), BatonError> {
        let mut first_error = None;
        let components: [&dyn Component; 2] = [self.ledger.as_ref(), &self.bus];
        for component in components {
            if let Err(e) = component.shutdown().await {
                error!(component = component.name(), error = %e, "shutdown failed");
                first_error.get_or_insert(e);
            }
        }
        info!("coordinator closed");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
