// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Baton integration tests.
//!
//! # Components
//!
//! - [`TestHarness`] - A coordinator over a throwaway SQLite file with fast
//!   reaper and poll intervals
//! - [`RecordingAlertSink`] - An [`AlertSink`](baton_core::AlertSink) that
//!   captures alerts in memory and can be told to fail

pub mod harness;
pub mod sink;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use sink::RecordingAlertSink;
