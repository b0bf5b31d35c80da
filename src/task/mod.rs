//! # Concurrency primitives.
//!
//! - [`Work`] cancellable, shareable handle to spawned work
//! - [`Pending`] a value that is either ready or still being produced
//! - [`Scheduler`] / [`TokioScheduler`] host scheduling seam

mod scheduler;
mod work;

pub(crate) use scheduler::next_turn;
pub use scheduler::{Job, Priority, Scheduler, TokioScheduler};
pub use work::{Outcome, Pending, Work};
