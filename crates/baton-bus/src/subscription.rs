// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Competing-consumer subscriptions.

use std::sync::Arc;

use baton_core::{BusError, Message};
use futures::Stream;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::bus::MessageBus;

/// One consumer of a topic.
///
/// Every message handed out by [`next`](Self::next) is `delivered` and must
/// be acked or nacked through the bus before its visibility timeout runs
/// out, or it is delivered again.
pub struct Subscription {
    bus: MessageBus,
    topic: String,
    notify: Arc<Notify>,
    cancel: CancellationToken,
    consumer_id: Uuid,
}

impl Subscription {
    pub(crate) fn new(bus: MessageBus, topic: String, cancel: CancellationToken) -> Self {
        let notify = bus.notifier(&topic);
        let consumer_id = Uuid::new_v4();
        debug!(topic = %topic, consumer = %consumer_id, "subscribed");
        Self {
            bus,
            topic,
            notify,
            cancel,
            consumer_id,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Identifier used in this consumer's log events.
    pub fn consumer_id(&self) -> Uuid {
        self.consumer_id
    }

    /// Token that cancels this subscription.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop this subscription. A pending [`next`](Self::next) returns
    /// [`BusError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the next message of the topic.
    ///
    /// Returns [`BusError::Cancelled`] once the subscription is cancelled and
    /// [`BusError::Closed`] once the bus shuts down.
    pub async fn next(&mut self) -> Result<Message, BusError> {
        let poll_interval = self.bus.config().poll_interval();
        loop {
            if self.cancel.is_cancelled() {
                return Err(BusError::Cancelled);
            }
            if self.bus.is_closed() {
                return Err(BusError::Closed);
            }

            // Register for wake-ups before looking, so a publish between the
            // claim attempt and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.bus.claim(&self.topic).await? {
                debug!(
                    id = %message.id,
                    topic = %self.topic,
                    consumer = %self.consumer_id,
                    "message handed to consumer"
                );
                return Ok(message);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(BusError::Cancelled),
                _ = self.bus.inner.shutdown.cancelled() => return Err(BusError::Closed),
                _ = &mut notified => {}
                // Picks up messages written by other processes.
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    /// Turn the subscription into a stream that ends on cancellation or
    /// shutdown.
    pub fn into_stream(self) -> impl Stream<Item = Result<Message, BusError>> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            match sub.next().await {
                Err(BusError::Cancelled | BusError::Closed) => None,
                result => Some((result, sub)),
            }
        })
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("consumer_id", &self.consumer_id)
            .finish()
    }
}
