// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes through one [`Database`] are serialized on tokio-rusqlite's
//! single background thread. Each component (bus, ledger) opens its own
//! `Database`, so they serialize only on SQLite's write lock, bounded by the
//! configured busy timeout.

use std::time::Duration;

use baton_config::model::StorageConfig;
use baton_core::StoreError;
use tracing::debug;

use crate::migrations;

/// Convert a tokio-rusqlite error into [`StoreError::Database`].
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> StoreError {
    StoreError::Database {
        source: Box::new(e),
    }
}

/// Handle to one SQLite connection running on its own background thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl Database {
    /// Open the database at `path` with default storage settings.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open_with(&config).await
    }

    /// Open the database described by `config`, apply PRAGMAs, and run migrations.
    ///
    /// `synchronous = FULL` makes every committed transaction durable before
    /// the call that committed it returns.
    pub async fn open_with(config: &StorageConfig) -> Result<Self, StoreError> {
        let path = config.database_path.clone();
        if let Some(parent) = std::path::Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| StoreError::Database {
                source: Box::new(e),
            })?;

        let wal_mode = config.wal_mode;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        conn.call(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if wal_mode {
                let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get(0)
                })?;
                debug!(journal_mode = %mode, "journal mode set");
            }
            conn.pragma_update(None, "synchronous", "FULL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(migrations::run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        debug!(path = %path, wal_mode, "database opened");
        Ok(Self { conn, path })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Filesystem path this database was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run a trivial query to confirm the connection is alive.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fold the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(path = %self.path, "WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), StoreError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(map_tr_err)
    }
}
