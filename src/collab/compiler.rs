//! # Compiled render strategy.
//!
//! A [`TemplateCompiler`] turns a template into a [`CompiledTemplate`] once;
//! the template then memoizes it until reset. Compilation is synchronous and
//! any error it returns fails the render that triggered it.
//!
//! The built-in [`SnapshotCompiler`] freezes a deep copy of the markup and
//! parses every `data-bind` attribute up front, so renders skip the fragment
//! resolver and never hit a parse error late. Because the copy is frozen,
//! later edits to the source markup are invisible until the template resets
//! (see `RenderOptions::reset_on_markup_change`).

use std::sync::Arc;

use super::{BIND_ATTR, BindingExpressions, BindingInitializer, DataValue};
use crate::dom::{Node, TemplateId};
use crate::error::RenderError;
use crate::task::Pending;
use crate::template::{
    BindingCache, Item, Markup, RenderDelay, RenderPlan, RenderResult, RenderTarget, Services,
    interpreted, recycle,
};

/// A ready-to-run render function produced by a [`TemplateCompiler`].
pub trait CompiledTemplate: Send + Sync + 'static {
    /// Renders `data` into `container` (or a fresh element).
    fn render(&self, data: Pending<DataValue>, container: Option<Node>) -> RenderResult;

    /// Renders one list item, reusing `recycled` when it is safe.
    fn render_item(&self, item: Pending<Item>, recycled: Option<Node>) -> RenderResult;
}

/// Builds compiled templates.
pub trait TemplateCompiler: Send + Sync + 'static {
    fn compile(&self, request: CompileRequest) -> Result<Arc<dyn CompiledTemplate>, RenderError>;
}

/// Everything a compiler may read about the template being compiled.
pub struct CompileRequest {
    pub template: TemplateId,
    pub target: RenderTarget,
    /// Element whose children are the markup.
    pub source: Node,
    pub extract_child: bool,
    pub enable_recycling: bool,
    pub debug_break_on_render: bool,
    pub(crate) plan: RenderPlan,
}

impl CompileRequest {
    /// Collaborators of the template.
    pub fn services(&self) -> &Services {
        &self.plan.services
    }

    /// The template's binding cache.
    pub fn cache(&self) -> &Arc<BindingCache> {
        &self.plan.cache
    }

    /// Binding initializer configured on the template.
    pub fn initializer(&self) -> Option<&BindingInitializer> {
        self.plan.initializer.as_ref()
    }
}

/// Reference [`TemplateCompiler`] over a frozen markup snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotCompiler;

impl TemplateCompiler for SnapshotCompiler {
    fn compile(&self, request: CompileRequest) -> Result<Arc<dyn CompiledTemplate>, RenderError> {
        let frozen = request.source.deep_clone();
        if request.extract_child && frozen.first_child().is_none() {
            return Err(RenderError::StrategyConstruction {
                error: "extract_child is set but the markup has no child".into(),
            });
        }
        for node in frozen.descendants() {
            if let Some(source) = node.attribute(BIND_ATTR) {
                request
                    .cache()
                    .expressions_for(&source, BindingExpressions::parse)
                    .map_err(|e| RenderError::StrategyConstruction { error: e.as_message() })?;
            }
        }
        tracing::debug!(template = request.template, target = ?request.target, "compiled snapshot");

        let mut plan = request.plan;
        plan.markup = Markup::Snapshot(frozen);
        plan.delay = RenderDelay::None;
        Ok(Arc::new(SnapshotTemplate {
            plan,
            recycling: request.enable_recycling,
        }))
    }
}

/// Output of [`SnapshotCompiler`].
pub struct SnapshotTemplate {
    plan: RenderPlan,
    recycling: bool,
}

impl CompiledTemplate for SnapshotTemplate {
    fn render(&self, data: Pending<DataValue>, container: Option<Node>) -> RenderResult {
        interpreted::render(self.plan.clone(), data, container)
    }

    fn render_item(&self, item: Pending<Item>, recycled: Option<Node>) -> RenderResult {
        recycle::render_item(self.plan.clone(), self.recycling, item, recycled)
    }
}
