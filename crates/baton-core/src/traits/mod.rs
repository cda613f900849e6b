// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between Baton components.
//!
//! All async traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod alert;
pub mod component;

pub use alert::AlertSink;
pub use component::Component;
