// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory alert sink.

use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use baton_core::{AlertSink, BudgetAlert, BusError};

/// Captures every alert it receives.
///
/// With [`set_failing(true)`](Self::set_failing) each delivery is rejected
/// with [`BusError::Closed`] and nothing is captured.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<BudgetAlert>>,
    failing: AtomicBool,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Alerts received so far, in arrival order.
    pub fn alerts(&self) -> Vec<BudgetAlert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Thresholds of the received alerts, in arrival order.
    pub fn thresholds(&self) -> Vec<u32> {
        self.alerts().iter().map(|a| a.threshold).collect()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send_alert(&self, alert: &BudgetAlert) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());
        Ok(())
    }
}
