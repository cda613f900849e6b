// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base lifecycle trait for store-backed components.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::HealthStatus;

/// Identity, health, and shutdown for a component that owns a store connection.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Returns the human-readable name of this component.
    fn name(&self) -> &str;

    /// Performs a health check against the underlying store.
    async fn health_check(&self) -> Result<HealthStatus, StoreError>;

    /// Gracefully shuts down the component, releasing any held resources.
    async fn shutdown(&self) -> Result<(), StoreError>;
}
