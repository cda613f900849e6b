// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete coordinator.
//!
//! Each test creates an isolated TestHarness with a temp SQLite file. Tests
//! are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use baton::{BatonError, Coordinator, CostLedger, CostRecordFilter, HealthStatus, MessageStatus};
use baton_config::model::{CostConfig, StorageConfig};
use baton_core::{AlertSink, BudgetPeriod};
use baton_test_utils::{RecordingAlertSink, TestHarness};
use futures::StreamExt;
use rust_decimal_macros::dec;
use serde_json::json;
use serial_test::serial;

const PATIENCE: Duration = Duration::from_secs(5);

// ---- Delivery order ----

#[tokio::test]
async fn higher_priority_is_delivered_first() {
    let harness = TestHarness::builder().build().await.unwrap();
    let baton = &harness.coordinator;

    let low = baton.publish("work", json!({"job": "A"}), 1).await.unwrap();
    let high = baton.publish("work", json!({"job": "B"}), 5).await.unwrap();
    assert!(low < high);

    let mut sub = baton.subscribe("work").unwrap();
    let first = sub.next().await.unwrap();
    assert_eq!(first.id, high);
    assert_eq!(first.payload, json!({"job": "B"}));
    baton.ack(first.id).await.unwrap();

    let second = sub.next().await.unwrap();
    assert_eq!(second.id, low);
    baton.ack(second.id).await.unwrap();

    let stats = baton.bus().stats("work").await.unwrap();
    assert_eq!(stats.get(MessageStatus::Acked), 2);
}

#[tokio::test]
async fn subscriber_stream_drains_topic() {
    let harness = TestHarness::builder().build().await.unwrap();
    let baton = &harness.coordinator;
    for n in 0..5 {
        baton.publish("events", json!({"n": n}), 0).await.unwrap();
    }

    let sub = baton.subscribe("events").unwrap();
    let cancel = sub.cancel_token();
    let received: Vec<_> = sub.into_stream().take(5).collect().await;
    cancel.cancel();

    let ns: Vec<i64> = received
        .into_iter()
        .map(|m| m.unwrap().payload["n"].as_i64().unwrap())
        .collect();
    assert_eq!(ns, vec![0, 1, 2, 3, 4]);
}

// ---- Retries ----

#[tokio::test]
async fn nacked_message_is_dead_lettered_after_max_retries() {
    let harness = TestHarness::builder()
        .with_max_retries(1)
        .build()
        .await
        .unwrap();
    let baton = &harness.coordinator;
    let id = baton.publish("jobs", json!("flaky"), 0).await.unwrap();
    let mut sub = baton.subscribe("jobs").unwrap();

    let m = sub.next().await.unwrap();
    assert_eq!(baton.nack(m.id).await.unwrap(), MessageStatus::Pending);

    let m = sub.next().await.unwrap();
    assert_eq!(m.id, id);
    assert_eq!(m.retry_count, 1);
    assert_eq!(baton.nack(m.id).await.unwrap(), MessageStatus::Failed);

    let dead = baton.bus().dead_letters("jobs").await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, id);
    assert!(matches!(
        baton.ack(id).await,
        Err(BatonError::Bus(baton_core::BusError::DeadLettered { .. }))
    ));
}

#[tokio::test]
async fn unacked_delivery_is_redelivered_after_visibility_timeout() {
    let harness = TestHarness::builder()
        .with_visibility_timeout_secs(1)
        .build()
        .await
        .unwrap();
    let baton = &harness.coordinator;
    let id = baton.publish("jobs", json!("slow"), 0).await.unwrap();

    let mut crashed = baton.subscribe("jobs").unwrap();
    let first = crashed.next().await.unwrap();
    assert_eq!(first.id, id);
    drop(crashed);

    let mut survivor = baton.subscribe("jobs").unwrap();
    let again = tokio::time::timeout(PATIENCE, survivor.next())
        .await
        .expect("redelivery within patience")
        .unwrap();
    assert_eq!(again.id, id);
    assert_eq!(again.retry_count, 1);
    baton.ack(id).await.unwrap();
}

// ---- Budget alerts ----

#[tokio::test]
async fn crossing_thresholds_publishes_alerts_on_the_bus() {
    let harness = TestHarness::builder()
        .with_budget(dec!(1))
        .with_thresholds(&[50, 100])
        .build()
        .await
        .unwrap();
    let baton = &harness.coordinator;
    let alerts = baton.bus().alert_topic();
    let mut sub = alerts.subscribe(baton.bus()).unwrap();

    baton
        .record("planner", "llm_call", dec!(0.60), 1_200, 300, true)
        .await
        .unwrap();
    let m = tokio::time::timeout(PATIENCE, sub.next())
        .await
        .unwrap()
        .unwrap();
    let alert = alerts.decode(&m).unwrap();
    assert_eq!(alert.threshold, 50);
    assert_eq!(alert.running_total, dec!(0.60));
    assert_eq!(alert.percent_used, dec!(60));
    assert_eq!(m.priority, baton.config().bus.max_priority);
    baton.ack(m.id).await.unwrap();

    baton
        .record("planner", "llm_call", dec!(0.45), 900, 250, true)
        .await
        .unwrap();
    let m = tokio::time::timeout(PATIENCE, sub.next())
        .await
        .unwrap()
        .unwrap();
    let alert = alerts.decode(&m).unwrap();
    assert_eq!(alert.threshold, 100);
    assert_eq!(alert.running_total, dec!(1.05));
    baton.ack(m.id).await.unwrap();

    baton
        .record("planner", "llm_call", dec!(0.10), 10, 10, true)
        .await
        .unwrap();
    let stats = baton.bus().stats(alerts.name()).await.unwrap();
    assert_eq!(stats.total(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_spend_alerts_each_threshold_once_on_the_bus() {
    let harness = TestHarness::builder()
        .with_budget(dec!(10))
        .with_thresholds(&[80, 90, 100])
        .build()
        .await
        .unwrap();
    let baton = &harness.coordinator;

    let mut handles = Vec::with_capacity(1_000);
    for i in 0..1_000 {
        let ledger = Arc::clone(baton.ledger());
        handles.push(tokio::spawn(async move {
            ledger
                .record(&format!("agent-{}", i % 4), "llm_call", dec!(0.01), 50, 10, true)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let alerts = baton.bus().alert_topic();
    let queued = baton.bus().recover(alerts.name()).await.unwrap();
    let mut thresholds: Vec<u32> = queued
        .iter()
        .map(|m| alerts.decode(m).unwrap().threshold)
        .collect();
    thresholds.sort_unstable();
    assert_eq!(thresholds, vec![80, 90, 100]);

    let summary = baton.summary(&CostRecordFilter::default()).await.unwrap();
    assert_eq!(summary.total_cost_usd, dec!(10.00));
    assert_eq!(summary.call_count, 1_000);
}

#[tokio::test]
async fn set_budget_rearms_thresholds() {
    let harness = TestHarness::builder()
        .with_budget(dec!(10))
        .with_thresholds(&[50])
        .build()
        .await
        .unwrap();
    let baton = &harness.coordinator;
    let alert_topic = baton.config().bus.alert_topic.clone();

    baton.record("a", "op", dec!(6), 0, 0, true).await.unwrap();
    assert_eq!(baton.bus().stats(&alert_topic).await.unwrap().total(), 1);

    baton.set_budget(dec!(20), &[50]).await.unwrap();
    baton.record("a", "op", dec!(4), 0, 0, true).await.unwrap();
    assert_eq!(baton.bus().stats(&alert_topic).await.unwrap().total(), 2);
}

#[tokio::test]
async fn failed_alert_delivery_is_retried_on_next_record() {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageConfig {
        database_path: dir.path().join("ledger.db").to_string_lossy().into_owned(),
        ..StorageConfig::default()
    };
    let cost = CostConfig {
        budget_limit_usd: Some(dec!(1)),
        alert_thresholds_pct: vec![80],
        budget_period: BudgetPeriod::Daily,
    };
    let sink = Arc::new(RecordingAlertSink::new());
    let ledger = CostLedger::open(&storage, &cost, Some(sink.clone() as Arc<dyn AlertSink>))
        .await
        .unwrap();

    sink.set_failing(true);
    ledger.record("a", "op", dec!(0.9), 0, 0, true).await.unwrap();
    assert!(sink.alerts().is_empty());

    sink.set_failing(false);
    ledger.record("a", "op", dec!(0.01), 0, 0, true).await.unwrap();
    assert_eq!(sink.thresholds(), vec![80]);
    assert_eq!(sink.alerts()[0].running_total, dec!(0.91));
}

// ---- Durability ----

#[tokio::test]
async fn state_survives_restart() {
    let harness = TestHarness::builder()
        .with_budget(dec!(1))
        .with_thresholds(&[50])
        .build()
        .await
        .unwrap();
    let baton = &harness.coordinator;

    let a = baton.publish("jobs", json!("a"), 2).await.unwrap();
    let b = baton.publish("jobs", json!("b"), 7).await.unwrap();
    let mut sub = baton.subscribe("jobs").unwrap();
    let in_flight = sub.next().await.unwrap();
    assert_eq!(in_flight.id, b);
    drop(sub);
    baton.record("agent", "op", dec!(0.75), 10, 5, true).await.unwrap();

    let harness = harness.reopen().await.unwrap();
    let baton = &harness.coordinator;

    let pending = baton.bus().recover("jobs").await.unwrap();
    let ids: Vec<_> = pending.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![b, a]);
    assert!(pending.iter().all(|m| m.status == MessageStatus::Pending));
    assert_eq!(pending[0].retry_count, 0);

    let summary = baton.summary(&CostRecordFilter::default()).await.unwrap();
    assert_eq!(summary.total_cost_usd, dec!(0.75));
    assert_eq!(summary.call_count, 1);

    let status = baton.ledger().budget_status().await.unwrap();
    assert_eq!(status.running_total, dec!(0.75));
    assert_eq!(status.fired_thresholds, vec![50]);

    baton.record("agent", "op", dec!(0.01), 0, 0, true).await.unwrap();
    let alert_topic = &baton.config().bus.alert_topic;
    assert_eq!(baton.bus().stats(alert_topic).await.unwrap().total(), 1);
}

// ---- Lifecycle ----

#[tokio::test]
async fn health_reports_every_component() {
    let harness = TestHarness::builder().build().await.unwrap();
    let health = harness.coordinator.health().await;
    let names: Vec<_> = health.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["bus", "cost-ledger"]);
    assert!(health.iter().all(|(_, s)| *s == HealthStatus::Healthy));
}

#[tokio::test]
async fn invalid_config_is_rejected_before_opening() {
    let result = TestHarness::builder()
        .with_config(|c| {
            c.bus.visibility_timeout_secs = 0;
            c.cost.alert_thresholds_pct.clear();
        })
        .build()
        .await;
    match result {
        Err(BatonError::Config(errors)) => assert_eq!(errors.len(), 2),
        Err(other) => panic!("expected config errors, got {other}"),
        Ok(_) => panic!("expected config errors"),
    }
}

#[tokio::test]
async fn publish_after_close_fails() {
    let harness = TestHarness::builder().build().await.unwrap();
    let bus = harness.coordinator.bus().clone();
    let mut sub = bus.subscribe("jobs").unwrap();
    let TestHarness { coordinator, .. } = harness;
    coordinator.close().await.unwrap();

    assert!(matches!(
        bus.publish("jobs", json!(1), 0).await,
        Err(baton_core::BusError::Closed)
    ));
    assert!(matches!(
        sub.next().await,
        Err(baton_core::BusError::Closed)
    ));
}

#[test]
#[serial]
fn load_reads_environment_overrides() {
    figment::Jail::expect_with(|jail| {
        let db = jail.directory().join("env.db");
        jail.set_env("BATON_STORAGE_DATABASE_PATH", db.to_string_lossy());
        jail.set_env("BATON_BUS_MAX_RETRIES", "7");
        jail.set_env("BATON_LOG_LEVEL", "debug");

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let baton = Coordinator::load().await.unwrap();
            assert_eq!(baton.config().bus.max_retries, 7);
            assert_eq!(baton.bus().config().max_retries, 7);
            baton.publish("jobs", json!("from env"), 0).await.unwrap();
            baton.close().await.unwrap();
        });
        assert!(db.exists());
        Ok(())
    });
}

#[test]
#[serial]
fn load_reports_every_invalid_value() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("BATON_BUS_POLL_INTERVAL_MS", "0");
        jail.set_env("BATON_COST_BUDGET_LIMIT_USD", "-1");

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result = runtime.block_on(Coordinator::load());
        match result {
            Err(BatonError::Config(errors)) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                assert!(messages.iter().any(|m| m.contains("poll_interval_ms")));
                assert!(messages.iter().any(|m| m.contains("budget_limit_usd")));
            }
            Err(other) => panic!("expected config errors, got {other}"),
            Ok(_) => panic!("expected config errors"),
        }
        Ok(())
    });
}
