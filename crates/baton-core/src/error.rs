// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Baton coordination core.
//!
//! Each component has its own error enum. Store failures are wrapped by the
//! component errors so callers can branch on the component-level variant
//! without digging into the storage layer.

use thiserror::Error;

use crate::types::{MessageId, MessageStatus};

/// Errors raised by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O or SQLite failure. The operation had no visible effect.
    #[error("storage error: {source}")]
    Database {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The referenced record does not exist.
    #[error("{table} record {id} not found")]
    NotFound { table: &'static str, id: i64 },

    /// The record's current status does not permit the requested transition.
    #[error("record {id} cannot move from {from} to {to}")]
    Conflict {
        id: i64,
        from: MessageStatus,
        to: MessageStatus,
    },

    /// The caller holds an earlier delivery of a message that has since been
    /// delivered again.
    #[error("record {id} delivery {presented} superseded by delivery {current}")]
    StaleDelivery { id: i64, presented: u32, current: u32 },

    /// A stored value could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors returned by the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// Durable store failure.
    #[error(transparent)]
    Store(StoreError),

    /// The message id does not exist.
    #[error("message {id} not found")]
    NotFound { id: MessageId },

    /// The message is in a status that does not allow `action`.
    #[error("cannot {action} message {id} while it is {status}")]
    Conflict {
        id: MessageId,
        status: MessageStatus,
        action: &'static str,
    },

    /// The message exhausted its retries and sits in the dead-letter state.
    #[error("message {id} is dead-lettered")]
    DeadLettered { id: MessageId },

    /// The ack or nack came from a consumer whose delivery timed out and was
    /// handed to someone else.
    #[error("delivery {presented} of message {id} is stale, current delivery is {current}")]
    StaleDelivery {
        id: MessageId,
        presented: u32,
        current: u32,
    },

    /// Priority outside the configured range.
    #[error("priority {priority} outside allowed range {min}..={max}")]
    InvalidPriority { priority: i32, min: i32, max: i32 },

    /// Topic name rejected before any write.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Typed decode found a different schema tag than expected.
    #[error("schema mismatch: expected {expected}, found {found:?}")]
    SchemaMismatch {
        expected: String,
        found: Option<String>,
    },

    /// The subscription was cancelled by its owner.
    #[error("subscription cancelled")]
    Cancelled,

    /// The bus is shutting down.
    #[error("message bus closed")]
    Closed,
}

impl From<StoreError> for BusError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => BusError::NotFound { id: MessageId(id) },
            StoreError::Conflict {
                id,
                from: MessageStatus::Failed,
                ..
            } => BusError::DeadLettered { id: MessageId(id) },
            StoreError::Conflict { id, from, to } => BusError::Conflict {
                id: MessageId(id),
                status: from,
                action: match to {
                    MessageStatus::Acked => "ack",
                    MessageStatus::Pending | MessageStatus::Failed => "nack",
                    MessageStatus::Delivered => "deliver",
                },
            },
            StoreError::StaleDelivery {
                id,
                presented,
                current,
            } => BusError::StaleDelivery {
                id: MessageId(id),
                presented,
                current,
            },
            other => BusError::Store(other),
        }
    }
}

impl BusError {
    /// Whether the error refers to an id that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BusError::NotFound { .. })
    }
}

/// Errors returned by the cost ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Durable store failure. The record was not written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Record input rejected before any write.
    #[error("invalid cost record: {0}")]
    InvalidRecord(String),

    /// Budget configuration rejected.
    #[error("invalid budget: {0}")]
    InvalidBudget(String),

    /// An aggregate over stored records does not fit in a decimal.
    #[error("cost total out of range")]
    Overflow,
}
