// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only cost record operations.

use baton_core::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row, TransactionBehavior, params, params_from_iter};
use rust_decimal::Decimal;

use super::budget_alerts;
use crate::codec::{format_ts, parse_text, parse_ts};
use crate::database::{Database, map_tr_err};
use crate::models::{
    BudgetWindow, CostRecord, CostRecordFilter, MeteredAppend, NewCostRecord, RecordId,
};

const COLUMNS: &str =
    "id, agent, operation, cost_usd, tokens_in, tokens_out, success, created_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CostRecord> {
    let cost: String = row.get(3)?;
    let tokens_in: i64 = row.get(4)?;
    let tokens_out: i64 = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(CostRecord {
        id: RecordId(row.get(0)?),
        agent: row.get(1)?,
        operation: row.get(2)?,
        cost_usd: parse_text(3, &cost)?,
        tokens_in: tokens_in.max(0) as u64,
        tokens_out: tokens_out.max(0) as u64,
        success: row.get(6)?,
        created_at: parse_ts(7, &created_at)?,
    })
}

/// Row values of a record about to be inserted.
struct PendingRow {
    stored: CostRecord,
    tokens_in: i64,
    tokens_out: i64,
    created_at: String,
}

fn prepare(record: &NewCostRecord) -> Result<PendingRow, StoreError> {
    let tokens_in = i64::try_from(record.tokens_in)
        .map_err(|_| StoreError::Serialization("tokens_in exceeds i64".into()))?;
    let tokens_out = i64::try_from(record.tokens_out)
        .map_err(|_| StoreError::Serialization("tokens_out exceeds i64".into()))?;
    let created_at = format_ts(&record.created_at);
    let stored_at = parse_ts(0, &created_at).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(PendingRow {
        stored: CostRecord {
            id: RecordId(0),
            agent: record.agent.clone(),
            operation: record.operation.clone(),
            cost_usd: record.cost_usd,
            tokens_in: record.tokens_in,
            tokens_out: record.tokens_out,
            success: record.success,
            created_at: stored_at,
        },
        tokens_in,
        tokens_out,
        created_at,
    })
}

fn insert(conn: &Connection, row: &mut PendingRow) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cost_records
         (agent, operation, cost_usd, tokens_in, tokens_out, success, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            row.stored.agent,
            row.stored.operation,
            row.stored.cost_usd.to_string(),
            row.tokens_in,
            row.tokens_out,
            row.stored.success,
            row.created_at,
        ],
    )?;
    row.stored.id = RecordId(conn.last_insert_rowid());
    Ok(())
}

/// Exact sum of `cost_usd` over records stamped at or after `since`.
///
/// Costs are stored as text, so the sum is taken here rather than with
/// SQL `SUM`, which would go through floating point.
fn sum_since(conn: &Connection, since: Option<&str>) -> rusqlite::Result<Decimal> {
    let mut stmt = conn.prepare(
        "SELECT cost_usd FROM cost_records WHERE ?1 IS NULL OR created_at >= ?1",
    )?;
    let mut rows = stmt.query(params![since])?;
    let mut total = Decimal::ZERO;
    while let Some(row) = rows.next()? {
        let raw: String = row.get(0)?;
        let cost: Decimal = parse_text(0, &raw)?;
        total = total.checked_add(cost).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                "cost total out of range".into(),
            )
        })?;
    }
    Ok(total)
}

/// Append a cost record. Returns the stored record with its id.
pub async fn append(db: &Database, record: &NewCostRecord) -> Result<CostRecord, StoreError> {
    let mut row = prepare(record)?;
    db.connection()
        .call(move |conn| {
            insert(conn, &mut row)?;
            Ok(row.stored)
        })
        .await
        .map_err(map_tr_err)
}

/// Append a cost record and settle the budget in the same transaction.
///
/// The period total is read after the insert, so it covers every writer of
/// the file. Each threshold the total has reached is claimed in
/// `budget_alerts`; only the claims this call won are returned.
pub async fn append_metered(
    db: &Database,
    record: &NewCostRecord,
    window: &BudgetWindow,
) -> Result<MeteredAppend, StoreError> {
    let mut row = prepare(record)?;
    let window = window.clone();
    let since = window.since.as_ref().map(format_ts);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            insert(&tx, &mut row)?;
            let period_total = sum_since(&tx, since.as_deref())?;
            let claimed = budget_alerts::claim_reached(&tx, &window, period_total)?;
            tx.commit()?;
            Ok(MeteredAppend {
                record: row.stored,
                period_total,
                claimed,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Exact spend since `since`, or over all records when `None`.
pub async fn period_total(
    db: &Database,
    since: Option<DateTime<Utc>>,
) -> Result<Decimal, StoreError> {
    let since = since.as_ref().map(format_ts);
    db.connection()
        .call(move |conn| sum_since(conn, since.as_deref()))
        .await
        .map_err(map_tr_err)
}

/// Records matching `filter`, oldest first.
pub async fn query(db: &Database, filter: &CostRecordFilter) -> Result<Vec<CostRecord>, StoreError> {
    let mut sql = format!("SELECT {COLUMNS} FROM cost_records WHERE 1 = 1");
    let mut values: Vec<Value> = Vec::new();

    if let Some(agent) = &filter.agent {
        values.push(Value::Text(agent.clone()));
        sql.push_str(&format!(" AND agent = ?{}", values.len()));
    }
    if let Some(since) = &filter.since {
        values.push(Value::Text(format_ts(since)));
        sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
    }
    if let Some(until) = &filter.until {
        values.push(Value::Text(format_ts(until)));
        sql.push_str(&format!(" AND created_at < ?{}", values.len()));
    }
    sql.push_str(" ORDER BY id ASC");

    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), record_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
