//! # Per-template render options.
//!
//! [`RenderOptions`] holds every setting that changes how a template renders.
//! Changing any of them through a `Template` setter drops the memoized render
//! strategy.
//!
//! ## Sentinel values
//! - `process_timeout_ms = 0` → no delay, bindings run right after attachment
//! - `process_timeout_ms < 0` → yield once to the scheduler, no timer
//! - `process_timeout_ms > 0` → wait that many milliseconds
//!
//! Data fields (everything except the initializer) deserialize from JSON with
//! missing fields taking their defaults:
//! ```rust
//! use bindery::template::{RenderDelay, RenderOptions};
//!
//! let opts: RenderOptions = serde_json::from_str(r#"{ "process_timeout_ms": -1 }"#).unwrap();
//! assert_eq!(opts.render_delay(), RenderDelay::Yield);
//! assert!(!opts.enable_recycling);
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collab::BindingInitializer;

/// Suspension applied between markup attachment and control/binding processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderDelay {
    /// Continue immediately.
    None,
    /// Resume at the next scheduling turn.
    Yield,
    /// Resume after the given duration.
    After(Duration),
}

/// Render configuration of one template.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Reuse output passed back to `render_item`.
    pub enable_recycling: bool,
    /// Delay before controls and bindings are processed (see sentinels above).
    pub process_timeout_ms: i64,
    /// Initializer used for bindings; the built-in one-way copy when `None`.
    #[serde(skip)]
    pub binding_initializer: Option<BindingInitializer>,
    /// Return the first child of the markup instead of a wrapper container.
    pub extract_child: bool,
    /// Never use the compiled strategy.
    pub disable_optimized_processing: bool,
    /// Emit a `DebugBreak` event on the first render.
    pub debug_break_on_render: bool,
    /// Drop the compiled strategy when the markup source mutates.
    pub reset_on_markup_change: bool,
}

impl RenderOptions {
    /// Converts `process_timeout_ms` into a [`RenderDelay`].
    #[inline]
    pub fn render_delay(&self) -> RenderDelay {
        match self.process_timeout_ms {
            0 => RenderDelay::None,
            n if n < 0 => RenderDelay::Yield,
            n => RenderDelay::After(Duration::from_millis(n.unsigned_abs())),
        }
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("enable_recycling", &self.enable_recycling)
            .field("process_timeout_ms", &self.process_timeout_ms)
            .field("binding_initializer", &self.binding_initializer.is_some())
            .field("extract_child", &self.extract_child)
            .field("disable_optimized_processing", &self.disable_optimized_processing)
            .field("debug_break_on_render", &self.debug_break_on_render)
            .field("reset_on_markup_change", &self.reset_on_markup_change)
            .finish()
    }
}
