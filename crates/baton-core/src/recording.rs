// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every call is a
//! no-op.

use metrics::{describe_counter, describe_gauge};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Register all Baton metric descriptions.
///
/// Called once at startup, after the embedding application installs a recorder.
pub fn register_metrics() {
    describe_counter!("baton_messages_published_total", "Messages published");
    describe_counter!("baton_messages_delivered_total", "Messages handed to consumers");
    describe_counter!("baton_messages_acked_total", "Messages acknowledged");
    describe_counter!("baton_messages_nacked_total", "Messages returned for redelivery");
    describe_counter!(
        "baton_messages_dead_lettered_total",
        "Messages moved to the failed state"
    );
    describe_counter!("baton_cost_records_total", "Metered operations recorded");
    describe_counter!("baton_cost_usd_total", "Recorded spend in micro-USD");
    describe_counter!("baton_budget_alerts_total", "Budget threshold alerts emitted");
    describe_gauge!("baton_budget_used_pct", "Percent of the active budget used");
}

/// Record a published message.
pub fn record_published(topic: &str) {
    metrics::counter!("baton_messages_published_total", "topic" => topic.to_string()).increment(1);
}

/// Record a message handed to a consumer.
pub fn record_delivered(topic: &str) {
    metrics::counter!("baton_messages_delivered_total", "topic" => topic.to_string()).increment(1);
}

/// Record an acknowledged message.
pub fn record_acked() {
    metrics::counter!("baton_messages_acked_total").increment(1);
}

/// Record a nack, explicit or by visibility timeout.
pub fn record_nacked(reason: &'static str) {
    metrics::counter!("baton_messages_nacked_total", "reason" => reason).increment(1);
}

/// Record a message moved to the failed state.
pub fn record_dead_lettered() {
    metrics::counter!("baton_messages_dead_lettered_total").increment(1);
}

/// Record a metered operation.
pub fn record_cost(agent: &str, cost_usd: Decimal) {
    metrics::counter!("baton_cost_records_total", "agent" => agent.to_string()).increment(1);
    // Counters are integral; track spend in micro-dollars.
    let micros = cost_usd
        .checked_mul(Decimal::from(1_000_000))
        .and_then(|m| m.trunc().to_u64())
        .unwrap_or(u64::MAX);
    metrics::counter!("baton_cost_usd_total", "unit" => "micro_usd").increment(micros);
}

/// Record an emitted budget alert.
pub fn record_budget_alert(threshold: u32) {
    metrics::counter!("baton_budget_alerts_total", "threshold" => threshold.to_string())
        .increment(1);
}

/// Set the percent of the active budget used.
pub fn set_budget_used_pct(pct: Decimal) {
    metrics::gauge!("baton_budget_used_pct").set(pct.to_f64().unwrap_or(0.0));
}
