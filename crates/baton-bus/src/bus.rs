// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The durable message bus.

use std::sync::{Arc, PoisonError, Weak};

use async_trait::async_trait;
use baton_config::model::{BusConfig, StorageConfig};
use baton_core::recording;
use baton_core::{
    BusError, Component, HealthStatus, Message, MessageId, MessageStatus, NewMessage, StoreError,
};
use baton_storage::Database;
use baton_storage::models::{MarkOutcome, MessageFilter, MessageOrder, ReleasedMessage, StatusCounts};
use baton_storage::queries::messages;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::subscription::Subscription;

pub(crate) struct BusInner {
    pub(crate) db: Database,
    pub(crate) config: BusConfig,
    /// Recorded on every delivery this bus hands out.
    instance_id: String,
    notifiers: DashMap<String, Arc<Notify>>,
    pub(crate) shutdown: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
    /// Error of the most recent visibility sweep, cleared by the next success.
    sweep_error: std::sync::Mutex<Option<String>>,
}

/// Durable, priority-ordered message bus.
///
/// Cloning is cheap and every clone refers to the same bus. Messages are
/// written to SQLite before `publish` returns and are delivered at least
/// once to exactly one subscriber of their topic.
#[derive(Clone)]
pub struct MessageBus {
    pub(crate) inner: Arc<BusInner>,
}

impl MessageBus {
    /// Open the store described by `storage` and start the bus.
    pub async fn open(storage: &StorageConfig, config: BusConfig) -> Result<Self, BusError> {
        let db = Database::open_with(storage).await?;
        Self::with_database(db, config).await
    }

    /// Start the bus on an already opened database.
    ///
    /// Deliveries whose visibility deadline already passed were abandoned by
    /// a process that stopped without closing. They are returned to `pending`
    /// without counting an attempt. Deliveries still inside their window are
    /// left to their holder, which may be another live process, and to the
    /// reaper.
    pub async fn with_database(db: Database, config: BusConfig) -> Result<Self, BusError> {
        let reset = messages::reset_expired(&db, Utc::now()).await?;
        if reset > 0 {
            info!(count = reset, "returned interrupted deliveries to pending");
        }
        for topic in messages::topics(&db).await? {
            let backlog = messages::recover(&db, &topic).await?;
            if !backlog.is_empty() {
                info!(topic = %topic, backlog = backlog.len(), "recovered pending messages");
            }
        }

        let bus = Self {
            inner: Arc::new(BusInner {
                db,
                config,
                instance_id: Uuid::new_v4().to_string(),
                notifiers: DashMap::new(),
                shutdown: CancellationToken::new(),
                reaper: Mutex::new(None),
                sweep_error: std::sync::Mutex::new(None),
            }),
        };
        let handle = spawn_reaper(Arc::downgrade(&bus.inner));
        *bus.inner.reaper.lock().await = Some(handle);
        debug!(
            path = %bus.inner.db.path(),
            instance = %bus.inner.instance_id,
            "message bus started"
        );
        Ok(bus)
    }

    /// Delivery settings in effect.
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Publish an untyped payload. Returns once the message is durable.
    pub async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        priority: i32,
    ) -> Result<MessageId, BusError> {
        self.publish_message(NewMessage {
            topic: topic.to_string(),
            priority,
            payload,
            schema: None,
        })
        .await
    }

    /// Publish a fully described message.
    ///
    /// Validation happens before any write, so a rejected message leaves no
    /// trace in the store.
    pub async fn publish_message(&self, message: NewMessage) -> Result<MessageId, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        validate_topic(&message.topic)?;
        let (min, max) = (self.inner.config.min_priority, self.inner.config.max_priority);
        if !(min..=max).contains(&message.priority) {
            return Err(BusError::InvalidPriority {
                priority: message.priority,
                min,
                max,
            });
        }

        let id = messages::append(&self.inner.db, &message).await?;
        recording::record_published(&message.topic);
        debug!(id = %id, topic = %message.topic, priority = message.priority, "message published");
        self.wake(&message.topic);
        Ok(id)
    }

    /// Subscribe to `topic`. Subscribers of one topic compete for messages.
    pub fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        self.subscribe_with_cancel(topic, CancellationToken::new())
    }

    /// Subscribe with a caller-owned cancellation token.
    pub fn subscribe_with_cancel(
        &self,
        topic: &str,
        cancel: CancellationToken,
    ) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        validate_topic(topic)?;
        Ok(Subscription::new(self.clone(), topic.to_string(), cancel))
    }

    /// Mark a delivered message processed. Acking twice is a no-op.
    ///
    /// Acks whichever delivery is current. Consumers holding the delivered
    /// [`Message`] should prefer [`ack_delivery`](Self::ack_delivery).
    pub async fn ack(&self, id: MessageId) -> Result<(), BusError> {
        self.settle_ack(id, None).await
    }

    /// Ack `message` only if it is still the current delivery.
    ///
    /// Fails with [`BusError::StaleDelivery`] when the visibility timeout
    /// passed and the message was handed to another consumer since.
    pub async fn ack_delivery(&self, message: &Message) -> Result<(), BusError> {
        self.settle_ack(message.id, Some(message.delivery_count)).await
    }

    async fn settle_ack(&self, id: MessageId, delivery: Option<u32>) -> Result<(), BusError> {
        match messages::mark_status(&self.inner.db, id, MessageStatus::Acked, delivery).await? {
            MarkOutcome::Applied => {
                recording::record_acked();
                debug!(id = %id, "message acked");
            }
            MarkOutcome::Unchanged => debug!(id = %id, "message already acked"),
        }
        Ok(())
    }

    /// Return a delivered message for redelivery after a failed attempt.
    ///
    /// Once its retry count exceeds `max_retries` the message is moved to the
    /// failed state and never delivered again. Returns the resulting status.
    pub async fn nack(&self, id: MessageId) -> Result<MessageStatus, BusError> {
        self.settle_nack(id, None).await
    }

    /// Nack `message` only if it is still the current delivery.
    pub async fn nack_delivery(&self, message: &Message) -> Result<MessageStatus, BusError> {
        self.settle_nack(message.id, Some(message.delivery_count)).await
    }

    async fn settle_nack(
        &self,
        id: MessageId,
        delivery: Option<u32>,
    ) -> Result<MessageStatus, BusError> {
        let released =
            messages::release(&self.inner.db, id, self.inner.config.max_retries, delivery)
                .await?;
        self.after_release(&released, "nack");
        Ok(released.status)
    }

    /// Requeue every delivery whose visibility timeout has passed.
    ///
    /// Runs periodically in the background; exposed for callers that want
    /// an immediate sweep. Returns the number of messages released.
    pub async fn reap_expired(&self) -> Result<usize, BusError> {
        reap(&self.inner).await
    }

    /// Fetch one message by id.
    pub async fn get(&self, id: MessageId) -> Result<Message, BusError> {
        Ok(messages::get(&self.inner.db, id).await?)
    }

    /// Messages of `topic` still awaiting processing, in delivery order.
    pub async fn recover(&self, topic: &str) -> Result<Vec<Message>, BusError> {
        Ok(messages::recover(&self.inner.db, topic).await?)
    }

    /// Messages of `topic` that exhausted their retries.
    pub async fn dead_letters(&self, topic: &str) -> Result<Vec<Message>, BusError> {
        let filter = MessageFilter::topic(topic).with_statuses(&[MessageStatus::Failed]);
        Ok(messages::query(&self.inner.db, &filter, MessageOrder::Id).await?)
    }

    /// Per-status message counts for `topic`.
    pub async fn stats(&self, topic: &str) -> Result<StatusCounts, BusError> {
        Ok(messages::status_counts(&self.inner.db, topic).await?)
    }

    /// Stop the reaper and close every subscription with [`BusError::Closed`].
    ///
    /// Messages this bus delivered but that were not yet acked or nacked go
    /// back to `pending` without counting an attempt.
    pub async fn close(&self) -> Result<(), BusError> {
        self.inner.shutdown.cancel();
        if let Some(handle) = self.inner.reaper.lock().await.take()
            && let Err(e) = handle.await
        {
            error!(error = %e, "reaper task failed");
        }
        let released = messages::release_owned(&self.inner.db, &self.inner.instance_id).await?;
        if released > 0 {
            info!(count = released, "returned in-flight deliveries to pending");
        }
        self.inner.db.checkpoint().await?;
        info!("message bus closed");
        Ok(())
    }

    /// Claim the next message of `topic` for one consumer.
    pub(crate) async fn claim(&self, topic: &str) -> Result<Option<Message>, BusError> {
        let claimed = messages::claim_next(
            &self.inner.db,
            topic,
            self.inner.config.visibility_timeout(),
            &self.inner.instance_id,
        )
        .await?;
        if let Some(message) = &claimed {
            recording::record_delivered(topic);
            debug!(
                id = %message.id,
                topic,
                retry_count = message.retry_count,
                delivery = message.delivery_count,
                "message delivered"
            );
        }
        Ok(claimed)
    }

    pub(crate) fn notifier(&self, topic: &str) -> Arc<Notify> {
        self.inner
            .notifiers
            .entry(topic.to_string())
            .or_default()
            .clone()
    }

    fn wake(&self, topic: &str) {
        self.inner.wake(topic);
    }

    fn after_release(&self, released: &ReleasedMessage, reason: &'static str) {
        self.inner.after_release(released, reason);
    }
}

impl BusInner {
    fn set_sweep_error(&self, error: Option<String>) {
        *self.sweep_error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn sweep_error(&self) -> Option<String> {
        self.sweep_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn wake(&self, topic: &str) {
        if let Some(notify) = self.notifiers.get(topic) {
            notify.notify_waiters();
        }
    }

    fn after_release(&self, released: &ReleasedMessage, reason: &'static str) {
        recording::record_nacked(reason);
        match released.status {
            MessageStatus::Failed => {
                recording::record_dead_lettered();
                warn!(
                    id = %released.id,
                    topic = %released.topic,
                    retry_count = released.retry_count,
                    reason,
                    "message exhausted retries"
                );
            }
            _ => {
                debug!(
                    id = %released.id,
                    topic = %released.topic,
                    retry_count = released.retry_count,
                    reason,
                    "message requeued"
                );
                self.wake(&released.topic);
            }
        }
    }
}

fn validate_topic(topic: &str) -> Result<(), BusError> {
    if topic.trim().is_empty() {
        return Err(BusError::InvalidTopic("topic must not be empty".to_string()));
    }
    Ok(())
}

async fn reap(inner: &BusInner) -> Result<usize, BusError> {
    let swept =
        messages::expire_deliveries(&inner.db, Utc::now(), inner.config.max_retries).await;
    inner.set_sweep_error(swept.as_ref().err().map(ToString::to_string));
    let released = swept?;
    for message in &released {
        inner.after_release(message, "visibility_timeout");
    }
    Ok(released.len())
}

/// Periodically requeue expired deliveries until the bus shuts down or is
/// dropped.
fn spawn_reaper(inner: Weak<BusInner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (interval, shutdown) = match inner.upgrade() {
            Some(inner) => (inner.config.reap_interval(), inner.shutdown.clone()),
            None => return,
        };
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(strong) = inner.upgrade() else {
                break;
            };
            match reap(&strong).await {
                Ok(0) => {}
                Ok(count) => debug!(count, "requeued expired deliveries"),
                Err(e) => error!(error = %e, "visibility timeout sweep failed"),
            }
        }
        debug!("reaper stopped");
    })
}

#[async_trait]
impl Component for MessageBus {
    fn name(&self) -> &str {
        "bus"
    }

    async fn health_check(&self) -> Result<HealthStatus, StoreError> {
        if self.is_closed() {
            return Ok(HealthStatus::Unhealthy("bus is closed".to_string()));
        }
        if let Err(e) = self.inner.db.ping().await {
            return Ok(HealthStatus::Unhealthy(e.to_string()));
        }
        match self.inner.sweep_error() {
            Some(e) => Ok(HealthStatus::Degraded(format!("visibility sweep failing: {e}"))),
            None => Ok(HealthStatus::Healthy),
        }
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        match self.close().await {
            Ok(()) => Ok(()),
            Err(BusError::Store(e)) => Err(e),
            Err(other) => Err(StoreError::Database {
                source: Box::new(other),
            }),
        }
    }
}
