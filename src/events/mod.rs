//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by templates, renders and work queues.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Template` (strategy, recycling), the interpreted renderer,
//!   `WorkQueue`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the listener spawned by `ServicesBuilder::build`, which fans
//!   out to a `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
