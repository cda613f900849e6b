// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable priority message bus for the Baton coordination core.
//!
//! Messages are persisted through `baton-storage` before `publish` returns.
//! Subscribers of a topic compete for its messages, highest priority first
//! and oldest first within a priority. A delivered message that is neither
//! acked nor nacked within the visibility timeout is delivered again; a
//! message nacked more than `max_retries` times is parked in the failed
//! state for inspection.

pub mod alert;
pub mod bus;
pub mod subscription;
pub mod typed;

pub use alert::BUDGET_ALERT_SCHEMA;
pub use bus::MessageBus;
pub use subscription::Subscription;
pub use typed::TypedTopic;
