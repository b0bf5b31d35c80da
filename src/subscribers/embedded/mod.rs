//! # Built-in subscribers
//!
//! - [`LogWriter`]: forwards events to `tracing` in a compact, greppable form.

mod log;

pub use log::LogWriter;
