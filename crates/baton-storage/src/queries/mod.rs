// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the message log, the cost ledger and budget alert
//! claims.

pub mod budget_alerts;
pub mod cost_records;
pub mod messages;
