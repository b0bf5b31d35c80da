//! Bounded-concurrency work queue.
//!
//! - [`WorkQueue`] runs at most *N* queued closures at once, supports
//!   cancellation of queued work, prioritized admission and reordering.

mod work_queue;

pub use work_queue::{DEFAULT_MAX_RUNNING, WorkQueue};
