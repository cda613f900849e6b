// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Baton coordination core.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single
//! background connection per [`Database`] via `tokio-rusqlite`, and typed
//! operations for the bus message log and the append-only cost ledger.

mod codec;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
