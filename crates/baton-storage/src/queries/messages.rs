// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message log operations backing the bus.
//!
//! Every status change is a compare-and-set inside an immediate transaction,
//! so two consumers racing for the same row cannot both win. Each claim
//! bumps `delivery_count` and records the claiming bus in `delivered_by`;
//! acks and nacks may present the count to prove they hold the current
//! delivery.

use std::time::Duration;

use baton_core::{StoreError, TransitionCheck};
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params, params_from_iter};

use crate::codec::{format_ts, parse_opt_ts, parse_text, parse_ts};
use crate::database::{Database, map_tr_err};
use crate::models::{
    MarkOutcome, Message, MessageFilter, MessageId, MessageOrder, MessageStatus, NewMessage,
    ReleasedMessage, StatusCounts,
};

const COLUMNS: &str = "id, topic, priority, payload, schema_tag, status, retry_count, \
                       created_at, delivered_at, acked_at, visible_until, delivery_count";

/// Upper bound on a single delivery's visibility window.
const MAX_VISIBILITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let payload: String = row.get(3)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(Message {
        id: MessageId(row.get(0)?),
        topic: row.get(1)?,
        priority: row.get(2)?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        schema: row.get(4)?,
        status: parse_text(5, &status)?,
        retry_count: row.get(6)?,
        created_at: parse_ts(7, &created_at)?,
        delivered_at: parse_opt_ts(8, row.get(8)?)?,
        acked_at: parse_opt_ts(9, row.get(9)?)?,
        visible_until: parse_opt_ts(10, row.get(10)?)?,
        delivery_count: row.get(11)?,
    })
}

fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Append a pending message. Returns the store-assigned id.
pub async fn append(db: &Database, message: &NewMessage) -> Result<MessageId, StoreError> {
    let payload = serde_json::to_string(&message.payload)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let topic = message.topic.clone();
    let priority = message.priority;
    let schema = message.schema.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (topic, priority, payload, schema_tag, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
                params![topic, priority, payload, schema, format_ts(&now_millis())],
            )?;
            Ok(MessageId(conn.last_insert_rowid()))
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one message by id.
pub async fn get(db: &Database, id: MessageId) -> Result<Message, StoreError> {
    db.connection()
        .call(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
                    params![id.0],
                    message_from_row,
                )
                .optional()?;
            Ok(found.ok_or(StoreError::NotFound {
                table: "messages",
                id: id.0,
            }))
        })
        .await
        .map_err(map_tr_err)?
}

/// Claim the best pending message of `topic` for one consumer of the bus
/// instance `owner`.
///
/// Selects by priority descending then id ascending, moves the row to
/// `delivered`, and stamps its visibility deadline. Returns `None` when the
/// topic has nothing pending.
pub async fn claim_next(
    db: &Database,
    topic: &str,
    visibility: Duration,
    owner: &str,
) -> Result<Option<Message>, StoreError> {
    let topic = topic.to_string();
    let owner = owner.to_string();
    let window = TimeDelta::from_std(visibility.min(MAX_VISIBILITY)).unwrap_or(TimeDelta::MAX);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let claimed = tx
                .query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM messages
                         WHERE topic = ?1 AND status = 'pending'
                         ORDER BY priority DESC, id ASC
                         LIMIT 1"
                    ),
                    params![topic],
                    message_from_row,
                )
                .optional()?;

            let Some(mut message) = claimed else {
                return Ok(None);
            };

            let now = now_millis();
            let deadline = now + window;
            tx.execute(
                "UPDATE messages SET status = 'delivered', delivered_at = ?1, visible_until = ?2,
                     delivery_count = delivery_count + 1, delivered_by = ?3
                 WHERE id = ?4 AND status = 'pending'",
                params![format_ts(&now), format_ts(&deadline), owner, message.id.0],
            )?;
            tx.commit()?;

            message.status = MessageStatus::Delivered;
            message.delivered_at = Some(now);
            message.visible_until = Some(deadline);
            message.delivery_count = message.delivery_count.saturating_add(1);
            Ok(Some(message))
        })
        .await
        .map_err(map_tr_err)
}

/// A delivered message's current delivery must match the one presented.
fn check_delivery(
    id: MessageId,
    from: MessageStatus,
    presented: Option<u32>,
    current: u32,
) -> Result<(), StoreError> {
    match presented {
        Some(presented) if from == MessageStatus::Delivered && presented != current => {
            Err(StoreError::StaleDelivery {
                id: id.0,
                presented,
                current,
            })
        }
        _ => Ok(()),
    }
}

/// Move a message to `to` if its current status allows it.
///
/// Repeating a terminal transition returns [`MarkOutcome::Unchanged`]; any
/// other disallowed transition is a [`StoreError::Conflict`]. With
/// `delivery` set, a delivered message only moves if that is still its
/// current delivery. Deliveries should go through [`claim_next`], which also
/// sets the visibility deadline.
pub async fn mark_status(
    db: &Database,
    id: MessageId,
    to: MessageStatus,
    delivery: Option<u32>,
) -> Result<MarkOutcome, StoreError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current: Option<(String, u32)> = tx
                .query_row(
                    "SELECT status, delivery_count FROM messages WHERE id = ?1",
                    params![id.0],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((current, delivery_count)) = current else {
                return Ok(Err(StoreError::NotFound {
                    table: "messages",
                    id: id.0,
                }));
            };
            let from: MessageStatus = parse_text(0, &current)?;
            if let Err(e) = check_delivery(id, from, delivery, delivery_count) {
                return Ok(Err(e));
            }

            match from.check_transition(to) {
                TransitionCheck::Unchanged => return Ok(Ok(MarkOutcome::Unchanged)),
                TransitionCheck::Rejected => {
                    return Ok(Err(StoreError::Conflict { id: id.0, from, to }));
                }
                TransitionCheck::Allowed => {}
            }

            let now = format_ts(&now_millis());
            let status = to.to_string();
            match to {
                MessageStatus::Acked => tx.execute(
                    "UPDATE messages SET status = ?1, acked_at = ?2, visible_until = NULL,
                         delivered_by = NULL
                     WHERE id = ?3",
                    params![status, now, id.0],
                )?,
                MessageStatus::Delivered => tx.execute(
                    "UPDATE messages SET status = ?1, delivered_at = ?2, visible_until = NULL
                     WHERE id = ?3",
                    params![status, now, id.0],
                )?,
                MessageStatus::Pending | MessageStatus::Failed => tx.execute(
                    "UPDATE messages SET status = ?1, visible_until = NULL, delivered_by = NULL
                     WHERE id = ?2",
                    params![status, id.0],
                )?,
            };
            tx.commit()?;
            Ok(Ok(MarkOutcome::Applied))
        })
        .await
        .map_err(map_tr_err)?
}

/// Count one more failed attempt and requeue, or fail the message once
/// `retry_count` would exceed `max_retries`.
fn release_row(
    tx: &rusqlite::Transaction<'_>,
    id: i64,
    topic: String,
    retry_count: u32,
    max_retries: u32,
) -> rusqlite::Result<ReleasedMessage> {
    let retry_count = retry_count.saturating_add(1);
    let status = if retry_count > max_retries {
        MessageStatus::Failed
    } else {
        MessageStatus::Pending
    };
    tx.execute(
        "UPDATE messages SET status = ?1, retry_count = ?2, visible_until = NULL,
             delivered_by = NULL
         WHERE id = ?3 AND status = 'delivered'",
        params![status.to_string(), retry_count, id],
    )?;
    Ok(ReleasedMessage {
        id: MessageId(id),
        topic,
        status,
        retry_count,
    })
}

/// Return a delivered message after a failed attempt (nack).
///
/// With `delivery` set, only that delivery of the message may be released.
pub async fn release(
    db: &Database,
    id: MessageId,
    max_retries: u32,
    delivery: Option<u32>,
) -> Result<ReleasedMessage, StoreError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row: Option<(String, String, u32, u32)> = tx
                .query_row(
                    "SELECT topic, status, retry_count, delivery_count FROM messages
                     WHERE id = ?1",
                    params![id.0],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            let Some((topic, status, retry_count, delivery_count)) = row else {
                return Ok(Err(StoreError::NotFound {
                    table: "messages",
                    id: id.0,
                }));
            };
            let from: MessageStatus = parse_text(1, &status)?;
            if let Err(e) = check_delivery(id, from, delivery, delivery_count) {
                return Ok(Err(e));
            }
            if from != MessageStatus::Delivered {
                return Ok(Err(StoreError::Conflict {
                    id: id.0,
                    from,
                    to: MessageStatus::Pending,
                }));
            }
            let released = release_row(&tx, id.0, topic, retry_count, max_retries)?;
            tx.commit()?;
            Ok(Ok(released))
        })
        .await
        .map_err(map_tr_err)?
}

/// Release every delivery whose visibility deadline is at or before `now`.
///
/// Each expiry counts as a failed attempt.
pub async fn expire_deliveries(
    db: &Database,
    now: DateTime<Utc>,
    max_retries: u32,
) -> Result<Vec<ReleasedMessage>, StoreError> {
    let cutoff = format_ts(&now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let expired: Vec<(i64, String, u32)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, topic, retry_count FROM messages
                     WHERE status = 'delivered' AND visible_until IS NOT NULL
                       AND visible_until <= ?1
                     ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![cutoff], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
                rows.collect::<Result<_, _>>()?
            };

            let mut released = Vec::with_capacity(expired.len());
            for (id, topic, retry_count) in expired {
                released.push(release_row(&tx, id, topic, retry_count, max_retries)?);
            }
            tx.commit()?;
            Ok(released)
        })
        .await
        .map_err(map_tr_err)
}

/// Return deliveries whose deadline passed by `now` to `pending` without
/// counting an attempt.
///
/// Run once at startup for deliveries abandoned by a process that stopped
/// without closing. Deliveries still inside their window may belong to a
/// live process on the same file and are left alone. Returns the number of
/// rows reset.
pub async fn reset_expired(db: &Database, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let cutoff = format_ts(&now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET status = 'pending', visible_until = NULL, delivered_by = NULL
                 WHERE status = 'delivered' AND visible_until IS NOT NULL
                   AND visible_until <= ?1",
                params![cutoff],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Return every delivery held by the bus instance `owner` to `pending`
/// without counting an attempt. Returns the number of rows released.
pub async fn release_owned(db: &Database, owner: &str) -> Result<usize, StoreError> {
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET status = 'pending', visible_until = NULL, delivered_by = NULL
                 WHERE status = 'delivered' AND delivered_by = ?1",
                params![owner],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of `topic` that still need processing, in delivery order.
pub async fn recover(db: &Database, topic: &str) -> Result<Vec<Message>, StoreError> {
    let filter = MessageFilter::topic(topic)
        .with_statuses(&[MessageStatus::Pending, MessageStatus::Delivered]);
    query(db, &filter, MessageOrder::PriorityThenId).await
}

/// Messages matching `filter`, in the requested order.
pub async fn query(
    db: &Database,
    filter: &MessageFilter,
    order: MessageOrder,
) -> Result<Vec<Message>, StoreError> {
    let mut sql = format!("SELECT {COLUMNS} FROM messages WHERE 1 = 1");
    let mut values: Vec<Value> = Vec::new();

    if let Some(topic) = &filter.topic {
        values.push(Value::Text(topic.clone()));
        sql.push_str(&format!(" AND topic = ?{}", values.len()));
    }
    if !filter.statuses.is_empty() {
        let mut placeholders = Vec::with_capacity(filter.statuses.len());
        for status in &filter.statuses {
            values.push(Value::Text(status.to_string()));
            placeholders.push(format!("?{}", values.len()));
        }
        sql.push_str(&format!(" AND status IN ({})", placeholders.join(", ")));
    }
    sql.push_str(match order {
        MessageOrder::PriorityThenId => " ORDER BY priority DESC, id ASC",
        MessageOrder::Id => " ORDER BY id ASC",
    });
    if let Some(limit) = filter.limit {
        values.push(Value::Integer(limit));
        sql.push_str(&format!(" LIMIT ?{}", values.len()));
    }

    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), message_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Distinct topics that have ever received a message.
pub async fn topics(db: &Database) -> Result<Vec<String>, StoreError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT topic FROM messages ORDER BY topic")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<Vec<String>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Message counts per status for one topic.
pub async fn status_counts(db: &Database, topic: &str) -> Result<StatusCounts, StoreError> {
    let topic = topic.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM messages WHERE topic = ?1 GROUP BY status",
            )?;
            let rows = stmt.query_map(params![topic], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((parse_text::<MessageStatus>(0, &status)?, count as u64))
            })?;
            let mut counts = StatusCounts::default();
            for row in rows {
                let (status, count) = row?;
                counts.counts.insert(status, count);
            }
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}
