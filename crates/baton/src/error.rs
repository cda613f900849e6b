// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level error type of the coordinator.

use baton_config::ConfigError;
use baton_core::{BusError, LedgerError, StoreError};
use thiserror::Error;

/// Errors surfaced by [`Coordinator`](crate::Coordinator).
#[derive(Debug, Error)]
pub enum BatonError {
    /// Configuration failed to load or validate. Render the contained
    /// diagnostics with [`baton_config::render_errors`].
    #[error("invalid configuration: {}", join_config_errors(.0))]
    Config(Vec<ConfigError>),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn join_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
