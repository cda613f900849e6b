// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Claims on budget thresholds, shared by every ledger on the file.

use baton_core::{StoreError, budget_percent};
use chrono::Utc;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;

use crate::codec::format_ts;
use crate::database::{Database, map_tr_err};
use crate::models::BudgetWindow;

/// Claim every threshold `total` has reached in the window's period.
///
/// Returns the thresholds this call inserted. Thresholds already claimed,
/// by this writer or another, are skipped.
pub(crate) fn claim_reached(
    conn: &Connection,
    window: &BudgetWindow,
    total: Decimal,
) -> rusqlite::Result<Vec<u32>> {
    let Some(limit) = window.limit_usd else {
        return Ok(Vec::new());
    };
    let pct = budget_percent(total, limit);
    let fired_at = format_ts(&Utc::now());
    let mut claimed = Vec::new();
    for &threshold in &window.thresholds_pct {
        if pct < Decimal::from(threshold) {
            break;
        }
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO budget_alerts (period_label, threshold, fired_at)
             VALUES (?1, ?2, ?3)",
            params![window.period_label, threshold, fired_at],
        )?;
        if inserted == 1 {
            claimed.push(threshold);
        }
    }
    Ok(claimed)
}

/// Thresholds claimed for `period_label`, ascending.
pub async fn fired(db: &Database, period_label: &str) -> Result<Vec<u32>, StoreError> {
    let period_label = period_label.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT threshold FROM budget_alerts WHERE period_label = ?1
                 ORDER BY threshold ASC",
            )?;
            let rows = stmt.query_map(params![period_label], |row| row.get(0))?;
            rows.collect::<Result<Vec<u32>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Drop one claim so the threshold fires again on the next append.
pub async fn release(db: &Database, period_label: &str, threshold: u32) -> Result<(), StoreError> {
    let period_label = period_label.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM budget_alerts WHERE period_label = ?1 AND threshold = ?2",
                params![period_label, threshold],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(())
}

/// Drop every claim of `period_label`. Returns the number removed.
pub async fn clear(db: &Database, period_label: &str) -> Result<usize, StoreError> {
    let period_label = period_label.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM budget_alerts WHERE period_label = ?1",
                params![period_label],
            )
        })
        .await
        .map_err(map_tr_err)
}
