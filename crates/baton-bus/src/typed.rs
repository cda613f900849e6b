// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema-tagged topics for strongly typed payloads.

use std::marker::PhantomData;

use baton_core::{BusError, Message, MessageId, NewMessage};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bus::MessageBus;
use crate::subscription::Subscription;

/// A topic whose messages carry one payload type.
///
/// Published messages are tagged with `schema`. Decoding checks the tag
/// before deserializing, so a producer that changed its format is reported
/// as [`BusError::SchemaMismatch`] instead of a confusing payload error.
pub struct TypedTopic<T> {
    name: String,
    schema: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedTopic<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            schema: self.schema.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TypedTopic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedTopic")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

impl<T> TypedTopic<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Serialize `value` and publish it with this topic's schema tag.
    pub async fn publish(
        &self,
        bus: &MessageBus,
        value: &T,
        priority: i32,
    ) -> Result<MessageId, BusError> {
        let payload = serde_json::to_value(value)?;
        bus.publish_message(NewMessage {
            topic: self.name.clone(),
            priority,
            payload,
            schema: Some(self.schema.clone()),
        })
        .await
    }

    pub fn subscribe(&self, bus: &MessageBus) -> Result<Subscription, BusError> {
        bus.subscribe(&self.name)
    }

    /// Decode a delivered message of this topic.
    pub fn decode(&self, message: &Message) -> Result<T, BusError> {
        if message.schema.as_deref() != Some(self.schema.as_str()) {
            return Err(BusError::SchemaMismatch {
                expected: self.schema.clone(),
                found: message.schema.clone(),
            });
        }
        Ok(serde_json::from_value(message.payload.clone())?)
    }
}
