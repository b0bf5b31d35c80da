//! # Render strategy selection.
//!
//! A template renders through one of two strategies:
//! - **compiled**: produced once by the [`TemplateCompiler`](crate::collab::TemplateCompiler)
//!   from a snapshot of the markup;
//! - **interpreted**: the general pipeline, re-reading the markup source on every render.
//!
//! The choice is memoized per target in an explicit [`StrategyState`] and
//! dropped by `Template::reset` (which every option setter calls).
//!
//! ```text
//!   Unresolved ──resolve()──► eligible? ──yes──► compile ──ok──► Resolved(Compiled)
//!       ▲                        │                  └──err──► (stays Unresolved, render fails)
//!       │                        └──no───► warn + StrategyFallback ──► Resolved(Interpreted)
//!       └──────────── reset() (both targets together) ◄──────────────────────┘
//! ```
//!
//! Global toggles are read only while resolving; flipping them does not
//! affect templates that already resolved.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::RenderOptions;
use crate::collab::{CompiledTemplate, MarkupRef};

static INTERPRET_ALL: AtomicBool = AtomicBool::new(false);
static DEBUG_BREAK_ON_RENDER: AtomicBool = AtomicBool::new(false);

/// Forces every template resolved afterwards onto the interpreted strategy.
pub fn set_interpret_all(on: bool) {
    INTERPRET_ALL.store(on, Ordering::Relaxed);
}

/// Current global interpret-all toggle.
pub fn interpret_all() -> bool {
    INTERPRET_ALL.load(Ordering::Relaxed)
}

/// Makes every template emit `DebugBreak` on its first render.
pub fn set_debug_break_on_render(on: bool) {
    DEBUG_BREAK_ON_RENDER.store(on, Ordering::Relaxed);
}

/// Current global debug-break toggle.
pub fn debug_break_on_render() -> bool {
    DEBUG_BREAK_ON_RENDER.load(Ordering::Relaxed)
}

/// Which public operation a strategy serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Render,
    RenderItem,
}

/// A resolved render function.
#[derive(Clone)]
pub enum RenderFn {
    Interpreted,
    Compiled(Arc<dyn CompiledTemplate>),
}

impl RenderFn {
    /// `"compiled"` or `"interpreted"`.
    pub fn as_label(&self) -> &'static str {
        match self {
            RenderFn::Interpreted => "interpreted",
            RenderFn::Compiled(_) => "compiled",
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, RenderFn::Compiled(_))
    }
}

impl fmt::Debug for RenderFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Memoization state of one target.
#[derive(Clone, Debug, Default)]
pub enum StrategyState {
    #[default]
    Unresolved,
    Resolved(RenderFn),
}

/// Reason the compiled strategy cannot be used, if any.
pub(crate) fn ineligibility(opts: &RenderOptions, href: Option<&MarkupRef>) -> Option<&'static str> {
    if interpret_all() {
        return Some("interpret-all is set globally");
    }
    if opts.disable_optimized_processing {
        return Some("optimized processing is disabled");
    }
    if opts.process_timeout_ms != 0 {
        return Some("templates with a process timeout cannot be compiled");
    }
    if href.is_some_and(|h| !h.is_element()) {
        return Some("templates loaded from a URI cannot be compiled");
    }
    None
}

/// Both targets' memoized strategies.
///
/// `generation` increases on every reset so a resolution that raced with a
/// reset is returned to its caller but not memoized.
#[derive(Debug, Default)]
pub(crate) struct StrategyCache {
    render: StrategyState,
    render_item: StrategyState,
    generation: u64,
    markup_revision: Option<u64>,
}

impl StrategyCache {
    pub(crate) fn get(&self, target: RenderTarget) -> &StrategyState {
        match target {
            RenderTarget::Render => &self.render,
            RenderTarget::RenderItem => &self.render_item,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Memoizes `f` unless a reset happened since `generation` was read.
    pub(crate) fn store(&mut self, target: RenderTarget, f: RenderFn, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        let slot = match target {
            RenderTarget::Render => &mut self.render,
            RenderTarget::RenderItem => &mut self.render_item,
        };
        *slot = StrategyState::Resolved(f);
        true
    }

    pub(crate) fn markup_revision(&self) -> Option<u64> {
        self.markup_revision
    }

    pub(crate) fn set_markup_revision(&mut self, revision: u64) {
        self.markup_revision = Some(revision);
    }

    /// Drops both targets together.
    pub(crate) fn reset(&mut self) {
        self.render = StrategyState::Unresolved;
        self.render_item = StrategyState::Unresolved;
        self.markup_revision = None;
        self.generation += 1;
    }
}
