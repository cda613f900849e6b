// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery behavior of the message bus against a real SQLite file.

use std::collections::HashSet;
use std::time::Duration;

use baton_bus::{BUDGET_ALERT_SCHEMA, MessageBus};
use baton_config::model::{BusConfig, StorageConfig};
use baton_core::{AlertSink, BudgetAlert, BudgetPeriod, BusError, MessageStatus};
use chrono::Utc;
use futures::StreamExt;
use rust_decimal_macros::dec;
use serde_json::json;
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn storage(dir: &TempDir) -> StorageConfig {
    StorageConfig {
        database_path: dir.path().join("bus.db").to_string_lossy().into_owned(),
        ..StorageConfig::default()
    }
}

fn fast_config() -> BusConfig {
    BusConfig {
        reap_interval_ms: 50,
        poll_interval_ms: 50,
        ..BusConfig::default()
    }
}

async fn open(dir: &TempDir, config: BusConfig) -> MessageBus {
    MessageBus::open(&storage(dir), config).await.unwrap()
}

#[tokio::test]
async fn delivers_by_priority_then_publish_order() {
    let dir = tempfile::tempdir().unwrap();
    let bus = open(&dir, fast_config()).await;

    bus.publish("work", json!("A"), 1).await.unwrap();
    bus.publish("work", json!("B"), 5).await.unwrap();
    bus.publish("work", json!("C"), 5).await.unwrap();

    let mut sub = bus.subscribe("work").unwrap();
    let mut seen = Vec::new();
    for _ in 0..3 {
        let message = timeout(WAIT, sub.next()).await.unwrap().unwrap();
        seen.push(message.payload.as_str().unwrap().to_string());
        bus.ack(message.id).await.unwrap();
    }
    assert_eq!(seen, vec!["B", "C", "A"]);
}

#[tokio::test]
async fn waiting_subscriber_wakes_on_publish() {
    let dir = tempfile::tempdir().unwrap();
    let config = BusConfig {
        poll_interval_ms: 60_000,
        ..fast_config()
    };
    let bus = open(&dir, config).await;

    let mut sub = bus.subscribe("wake").unwrap();
    let waiter = tokio::spawn(async move { sub.next().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let id = bus.publish("wake", json!({"n": 1}), 0).await.unwrap();
    let message = timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
    assert_eq!(message.id, id);
    assert_eq!(message.status, MessageStatus::Delivered);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_consumers_each_get_distinct_messages() {
    let dir = tempfile::tempdir().unwrap();
    let bus = open(&dir, fast_config()).await;

    for i in 0..40 {
        bus.publish("jobs", json!(i), 0).await.unwrap();
    }

    let mut workers = Vec::new();
    for _ in 0..4 {
        let bus = bus.clone();
        let mut sub = bus.subscribe("jobs").unwrap();
        workers.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            while let Ok(Ok(message)) = timeout(Duration::from_millis(300), sub.next()).await {
                bus.ack(message.id).await.unwrap();
                ids.push(message.id);
            }
            ids
        }));
    }

    let mut all = Vec::new();
    for worker in workers {
        all.extend(worker.await.unwrap());
    }
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), 40, "every message delivered exactly once");
    assert_eq!(unique.len(), 40);
    assert_eq!(bus.stats("jobs").await.unwrap().get(MessageStatus::Acked), 40);
}

#[tokio::test]
async fn ack_twice_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let bus = open(&dir, fast_config()).await;
    bus.publish("t", json!({}), 0).await.unwrap();

    let mut sub = bus.subscribe("t").unwrap();
    let message = timeout(WAIT, sub.next()).await.unwrap().unwrap();
    bus.ack(message.id).await.unwrap();
    bus.ack(message.id).await.unwrap();

    let stored = bus.get(message.id).await.unwrap();
    assert_eq!(stored.status, MessageStatus::Acked);
    assert!(stored.acked_at.is_some());
}

#[tokio::test]
async fn nack_redelivers_then_dead_letters() {
    let dir = tempfile::tempdir().unwrap();
    let bus = open(&dir, fast_config()).await;
    let id = bus.publish("flaky", json!({"op": "charge"}), 0).await.unwrap();

    let mut sub = bus.subscribe("flaky").unwrap();
    for attempt in 1..=3u32 {
        let message = timeout(WAIT, sub.next()).await.unwrap().unwrap();
        assert_eq!(message.id, id);
        assert_eq!(message.retry_count, attempt - 1);
        assert_eq!(bus.nack(id).await.unwrap(), MessageStatus::Pending);
    }

    let message = timeout(WAIT, sub.next()).await.unwrap().unwrap();
    assert_eq!(bus.nack(message.id).await.unwrap(), MessageStatus::Failed);

    assert!(timeout(Duration::from_millis(200), sub.next()).await.is_err());
    let dead = bus.dead_letters("flaky").await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].retry_count, 4);

    assert!(matches!(bus.ack(id).await, Err(BusError::DeadLettered { .. })));
    assert!(matches!(bus.nack(id).await, Err(BusError::DeadLettered { .. })));
}

#[tokio::test]
async fn unacked_delivery_is_redelivered_after_visibility_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let config = BusConfig {
        visibility_timeout_secs: 1,
        ..fast_config()
    };
    let bus = open(&dir, config).await;
    let id = bus.publish("slow", json!({}), 0).await.unwrap();

    let mut first = bus.subscribe("slow").unwrap();
    let message = timeout(WAIT, first.next()).await.unwrap().unwrap();
    assert_eq!(message.id, id);
    drop(first);

    let mut second = bus.subscribe("slow").unwrap();
    let again = timeout(WAIT, second.next()).await.unwrap().unwrap();
    assert_eq!(again.id, id);
    assert_eq!(again.retry_count, 1);
    bus.ack(id).await.unwrap();
}

#[tokio::test]
async fn manual_reap_counts_expired_deliveries() {
    let dir = tempfile::tempdir().unwrap();
    let config = BusConfig {
        visibility_timeout_secs: 1,
        reap_interval_ms: 60_000,
        ..fast_config()
    };
    let bus = open(&dir, config).await;
    bus.publish("t", json!({}), 0).await.unwrap();
    let mut sub = bus.subscribe("t").unwrap();
    timeout(WAIT, sub.next()).await.unwrap().unwrap();

    assert_eq!(bus.reap_expired().await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(bus.reap_expired().await.unwrap(), 1);
    assert_eq!(bus.stats("t").await.unwrap().get(MessageStatus::Pending), 1);
}

#[tokio::test]
async fn messages_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let bus = open(&dir, fast_config()).await;
    let kept = bus.publish("durable", json!("kept"), 2).await.unwrap();
    let in_flight = bus.publish("durable", json!("in-flight"), 9).await.unwrap();
    let mut sub = bus.subscribe("durable").unwrap();
    let claimed = timeout(WAIT, sub.next()).await.unwrap().unwrap();
    assert_eq!(claimed.id, in_flight);
    bus.close().await.unwrap();
    drop(sub);
    drop(bus);

    let bus = open(&dir, fast_config()).await;
    let backlog = bus.recover("durable").await.unwrap();
    assert_eq!(
        backlog.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![in_flight, kept]
    );
    assert!(backlog.iter().all(|m| m.status == MessageStatus::Pending));
    assert_eq!(backlog[0].retry_count, 0);

    let mut sub = bus.subscribe("durable").unwrap();
    let first = timeout(WAIT, sub.next()).await.unwrap().unwrap();
    assert_eq!(first.id, in_flight);
}

#[tokio::test]
async fn second_bus_on_the_file_leaves_live_deliveries_alone() {
    let dir = tempfile::tempdir().unwrap();
    let first = open(&dir, fast_config()).await;
    let id = first.publish("shared", json!("only"), 0).await.unwrap();
    let mut holder = first.subscribe("shared").unwrap();
    let held = timeout(WAIT, holder.next()).await.unwrap().unwrap();
    assert_eq!(held.id, id);

    let second = open(&dir, fast_config()).await;
    assert_eq!(
        second.get(id).await.unwrap().status,
        MessageStatus::Delivered
    );
    let mut rival = second.subscribe("shared").unwrap();
    assert!(
        timeout(Duration::from_millis(300), rival.next()).await.is_err(),
        "message still held by the first bus must not be handed out again"
    );

    first.ack_delivery(&held).await.unwrap();
    assert_eq!(second.get(id).await.unwrap().status, MessageStatus::Acked);
}

#[tokio::test]
async fn closing_one_bus_returns_only_its_own_deliveries() {
    let dir = tempfile::tempdir().unwrap();
    let first = open(&dir, fast_config()).await;
    let second = open(&dir, fast_config()).await;
    let a = first.publish("shared", json!("a"), 5).await.unwrap();
    let b = first.publish("shared", json!("b"), 1).await.unwrap();

    let mut sub_first = first.subscribe("shared").unwrap();
    assert_eq!(timeout(WAIT, sub_first.next()).await.unwrap().unwrap().id, a);
    let mut sub_second = second.subscribe("shared").unwrap();
    assert_eq!(timeout(WAIT, sub_second.next()).await.unwrap().unwrap().id, b);

    first.close().await.unwrap();
    let a_now = second.get(a).await.unwrap();
    assert_eq!(a_now.status, MessageStatus::Pending);
    assert_eq!(a_now.retry_count, 0);
    assert_eq!(second.get(b).await.unwrap().status, MessageStatus::Delivered);
}

#[tokio::test]
async fn late_ack_after_redelivery_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = BusConfig {
        visibility_timeout_secs: 1,
        ..fast_config()
    };
    let bus = open(&dir, config).await;
    let id = bus.publish("slow", json!({}), 0).await.unwrap();

    let mut slow = bus.subscribe("slow").unwrap();
    let stale = timeout(WAIT, slow.next()).await.unwrap().unwrap();
    let mut fast = bus.subscribe("slow").unwrap();
    let current = timeout(WAIT, fast.next()).await.unwrap().unwrap();
    assert_eq!(current.id, id);
    assert_eq!(current.delivery_count, stale.delivery_count + 1);

    let err = bus.ack_delivery(&stale).await.unwrap_err();
    assert!(matches!(err, BusError::StaleDelivery { .. }));
    assert!(matches!(
        bus.nack_delivery(&stale).await,
        Err(BusError::StaleDelivery { .. })
    ));
    assert_eq!(bus.get(id).await.unwrap().status, MessageStatus::Delivered);

    bus.ack_delivery(&current).await.unwrap();
    assert_eq!(bus.get(id).await.unwrap().status, MessageStatus::Acked);
}

#[tokio::test]
async fn cancelled_subscription_returns_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let bus = open(&dir, fast_config()).await;

    let token = CancellationToken::new();
    let mut sub = bus.subscribe_with_cancel("quiet", token.clone()).unwrap();
    let waiter = tokio::spawn(async move { sub.next().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let result = timeout(WAIT, waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(BusError::Cancelled)));
}

#[tokio::test]
async fn close_wakes_waiting_subscribers_with_closed() {
    let dir = tempfile::tempdir().unwrap();
    let bus = open(&dir, fast_config()).await;

    let mut sub = bus.subscribe("quiet").unwrap();
    let waiter = tokio::spawn(async move { sub.next().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.close().await.unwrap();

    let result = timeout(WAIT, waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(BusError::Closed)));
}

#[tokio::test]
async fn stream_yields_messages_and_ends_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let bus = open(&dir, fast_config()).await;
    bus.publish("s", json!(1), 0).await.unwrap();
    bus.publish("s", json!(2), 0).await.unwrap();

    let sub = bus.subscribe("s").unwrap();
    let token = sub.cancel_token();
    let mut stream = Box::pin(sub.into_stream());

    for expected in [1, 2] {
        let message = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(message.payload, json!(expected));
        bus.ack(message.id).await.unwrap();
    }

    token.cancel();
    assert!(timeout(WAIT, stream.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn alerts_are_published_on_the_reserved_topic() {
    let dir = tempfile::tempdir().unwrap();
    let bus = open(&dir, fast_config()).await;

    let alert = BudgetAlert {
        threshold: 80,
        percent_used: dec!(80.5),
        running_total: dec!(8.05),
        limit_usd: dec!(10),
        period: BudgetPeriod::Monthly,
        period_label: "2026-10".into(),
        fired_at: Utc::now(),
    };
    bus.send_alert(&alert).await.unwrap();

    let topic = bus.alert_topic();
    assert_eq!(topic.name(), "budget.alerts");
    let mut sub = topic.subscribe(&bus).unwrap();
    let message = timeout(WAIT, sub.next()).await.unwrap().unwrap();
    assert_eq!(message.priority, bus.config().max_priority);
    assert_eq!(message.schema.as_deref(), Some(BUDGET_ALERT_SCHEMA));

    let decoded = topic.decode(&message).unwrap();
    assert_eq!(decoded.threshold, 80);
    assert_eq!(decoded.running_total, dec!(8.05));
    assert_eq!(decoded.period_label, "2026-10");
}

#[tokio::test]
async fn idle_subscription_stays_pending_until_publish() {
    let dir = tempfile::tempdir().unwrap();
    let config = BusConfig {
        poll_interval_ms: 60_000,
        ..fast_config()
    };
    let bus = open(&dir, config).await;
    let mut sub = bus.subscribe("idle").unwrap();
    let mut next = tokio_test::task::spawn(sub.next());

    tokio_test::assert_pending!(next.poll());
    tokio::time::sleep(Duration::from_millis(100)).await;
    tokio_test::assert_pending!(next.poll());

    let id = bus.publish("idle", json!({}), 0).await.unwrap();
    let mut delivered = None;
    for _ in 0..100 {
        if let std::task::Poll::Ready(result) = next.poll() {
            delivered = Some(result.unwrap());
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(delivered.unwrap().id, id);
}
