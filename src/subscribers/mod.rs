//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Template / render / WorkQueue ── publish(Event) ──► Bus
//!                                                      │
//!                                   (listener task) ◄──┘
//!                                          │
//!                                   SubscriberSet::emit
//!                                          │
//!                              ┌───────────┼───────────┐
//!                              ▼           ▼           ▼
//!                          LogWriter    Metrics     Custom
//! ```
//!
//! [`LogWriter`] is only exported with the `logging` feature.

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
