//! # Templates.
//!
//! A [`Template`] owns a markup source, its [`RenderOptions`], the memoized
//! render strategy and the [`BindingCache`]. It is a cheap, cloneable handle.
//!
//! ```text
//! Template::render(data, container?)
//!     │
//!     └─► resolve(Render) ── Resolved? ──► memoized RenderFn
//!               │ Unresolved
//!               ├─ ineligible ──► Interpreted ──► interpreted::render
//!               └─ eligible   ──► TemplateCompiler::compile ──► CompiledTemplate::render
//!
//! Template::render_item(item, recycled?)
//!     └─► resolve(RenderItem) ──► recycle::render_item / CompiledTemplate::render_item
//! ```
//!
//! ## Rules
//! - Every option setter resets both memoized strategies together.
//! - A compile failure rejects both handles of that call with
//!   `StrategyConstruction` and leaves the strategy unresolved.
//! - The template lock is never held while a collaborator runs.
//!
//! ## Example
//! ```rust
//! use bindery::{Node, Pending, Services, Template};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let markup = Node::new("div");
//! let title = Node::new("h1");
//! title.set_attribute("data-bind", "text: title");
//! markup.append_child(&title);
//!
//! let template = Template::new(Some(markup), Services::default());
//! let result = template.render(Pending::Ready(json!({ "title": "Hello" })), None);
//! let root = result.complete.await.unwrap();
//! assert_eq!(root.first_child().and_then(|h| h.text()).as_deref(), Some("Hello"));
//! # }
//! ```

mod cache;
pub(crate) mod interpreted;
mod options;
pub(crate) mod recycle;
mod result;
mod services;
mod strategy;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use cache::{BindingCache, CacheEntry, Teardown};
pub use interpreted::{LOADING_CLASS, TEMPLATE_CLASS};
pub(crate) use interpreted::{Markup, RenderPlan};
pub use options::{RenderDelay, RenderOptions};
pub use result::{Item, RenderResult};
pub use services::{Services, ServicesBuilder};
pub use strategy::{
    RenderFn, RenderTarget, StrategyState, debug_break_on_render, interpret_all,
    set_debug_break_on_render, set_interpret_all,
};

use strategy::{StrategyCache, ineligibility};

use crate::collab::{BindingInitializer, CompileRequest, DataValue, MarkupRef};
use crate::dom::{Node, TemplateId};
use crate::error::RenderError;
use crate::events::{Event, EventKind};
use crate::task::Pending;

static TEMPLATE_IDS: AtomicU64 = AtomicU64::new(1);

struct TemplateState {
    options: RenderOptions,
    href: Option<MarkupRef>,
    strategies: StrategyCache,
}

struct TemplateInner {
    id: TemplateId,
    element: Node,
    services: Services,
    state: Mutex<TemplateState>,
    counter: Arc<AtomicU64>,
    cache: Arc<BindingCache>,
}

/// Reusable markup plus render configuration.
#[derive(Clone)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

impl Template {
    /// Creates a template over `element` (a fresh `div` when `None`).
    pub fn new(element: Option<Node>, services: Services) -> Self {
        Self::with_options(element, RenderOptions::default(), services)
    }

    /// Creates a template with explicit options.
    pub fn with_options(element: Option<Node>, options: RenderOptions, services: Services) -> Self {
        let id = TEMPLATE_IDS.fetch_add(1, Ordering::Relaxed);
        let element = element.unwrap_or_else(|| Node::new("div"));
        services
            .bus()
            .publish(Event::new(EventKind::TemplateCreated).with_template(id));
        Self {
            inner: Arc::new(TemplateInner {
                id,
                element,
                services,
                state: Mutex::new(TemplateState {
                    options,
                    href: None,
                    strategies: StrategyCache::default(),
                }),
                counter: Arc::new(AtomicU64::new(0)),
                cache: Arc::new(BindingCache::default()),
            }),
        }
    }

    /// Renders the markup at `href` once with a throwaway template.
    pub fn render_href(
        services: &Services,
        href: impl Into<String>,
        data: Pending<DataValue>,
        container: Option<Node>,
    ) -> RenderResult {
        let template = Template::new(None, services.clone());
        template.set_href(Some(MarkupRef::Uri(href.into())));
        template.render(data, container)
    }

    fn state(&self) -> MutexGuard<'_, TemplateState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, ev: Event) {
        self.inner.services.bus().publish(ev.with_template(self.inner.id));
    }

    /// Identity stamped on recyclable output.
    pub fn id(&self) -> TemplateId {
        self.inner.id
    }

    /// Markup element used when no href is set.
    pub fn element(&self) -> &Node {
        &self.inner.element
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    pub fn binding_cache(&self) -> &Arc<BindingCache> {
        &self.inner.cache
    }

    /// Snapshot of the current options.
    pub fn options(&self) -> RenderOptions {
        self.state().options.clone()
    }

    pub fn href(&self) -> Option<MarkupRef> {
        self.state().href.clone()
    }

    /// Number of renders started through the render pipeline.
    pub fn render_count(&self) -> u64 {
        self.inner.counter.load(Ordering::Relaxed)
    }

    /// Memoization state of `target`.
    pub fn strategy(&self, target: RenderTarget) -> StrategyState {
        self.state().strategies.get(target).clone()
    }

    // === Setters (each one resets the strategy) ===

    fn update(&self, f: impl FnOnce(&mut TemplateState)) {
        {
            let mut st = self.state();
            f(&mut st);
            st.strategies.reset();
        }
        self.publish(Event::new(EventKind::StrategyReset));
    }

    pub fn set_enable_recycling(&self, on: bool) {
        self.update(|st| st.options.enable_recycling = on);
    }

    pub fn set_process_timeout_ms(&self, ms: i64) {
        self.update(|st| st.options.process_timeout_ms = ms);
    }

    pub fn set_binding_initializer(&self, initializer: Option<BindingInitializer>) {
        self.update(|st| st.options.binding_initializer = initializer);
    }

    pub fn set_extract_child(&self, on: bool) {
        self.update(|st| st.options.extract_child = on);
    }

    pub fn set_disable_optimized_processing(&self, on: bool) {
        self.update(|st| st.options.disable_optimized_processing = on);
    }

    pub fn set_debug_break_on_render(&self, on: bool) {
        self.update(|st| st.options.debug_break_on_render = on);
    }

    pub fn set_reset_on_markup_change(&self, on: bool) {
        self.update(|st| st.options.reset_on_markup_change = on);
    }

    /// Loads markup from `href` instead of [`Template::element`].
    pub fn set_href(&self, href: Option<MarkupRef>) {
        self.update(|st| st.href = href);
    }

    /// Drops both memoized strategies.
    pub fn reset(&self) {
        self.update(|_| {});
    }

    // === Rendering ===

    /// Renders `data` into `container` (or a fresh element of the template's tag).
    pub fn render(&self, data: Pending<DataValue>, container: Option<Node>) -> RenderResult {
        match self.resolve(RenderTarget::Render) {
            Ok(RenderFn::Compiled(compiled)) => compiled.render(data, container),
            Ok(RenderFn::Interpreted) => self.render_interpreted(data, container),
            Err(e) => self.fail(e),
        }
    }

    /// Renders one item, reusing `recycled` when recycling allows it.
    pub fn render_item(&self, item: Pending<Item>, recycled: Option<Node>) -> RenderResult {
        match self.resolve(RenderTarget::RenderItem) {
            Ok(RenderFn::Compiled(compiled)) => compiled.render_item(item, recycled),
            Ok(RenderFn::Interpreted) => {
                let (plan, recycling) = {
                    let st = self.state();
                    (self.plan(&st), st.options.enable_recycling)
                };
                recycle::render_item(plan, recycling, item, recycled)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Renders through the interpreted pipeline regardless of strategy.
    pub fn render_interpreted(&self, data: Pending<DataValue>, container: Option<Node>) -> RenderResult {
        let plan = self.plan(&self.state());
        interpreted::render(plan, data, container)
    }

    fn fail(&self, e: RenderError) -> RenderResult {
        self.publish(Event::new(EventKind::RenderFailed).with_reason(e.to_string()));
        RenderResult::failed(e)
    }

    fn markup_source(&self, st: &TemplateState) -> Node {
        match &st.href {
            Some(MarkupRef::Element(node)) => node.clone(),
            _ => self.inner.element.clone(),
        }
    }

    fn plan(&self, st: &TemplateState) -> RenderPlan {
        let markup = st
            .href
            .clone()
            .unwrap_or_else(|| MarkupRef::Element(self.inner.element.clone()));
        RenderPlan {
            template: self.inner.id,
            tag: self.inner.element.tag().to_string(),
            markup: Markup::Resolve(markup),
            extract_child: st.options.extract_child,
            delay: st.options.render_delay(),
            initializer: st.options.binding_initializer.clone(),
            debug_break: st.options.debug_break_on_render || debug_break_on_render(),
            stamp_origin: false,
            counter: Arc::clone(&self.inner.counter),
            cache: Arc::clone(&self.inner.cache),
            services: self.inner.services.clone(),
        }
    }

    /// Returns the memoized strategy for `target`, resolving it if needed.
    fn resolve(&self, target: RenderTarget) -> Result<RenderFn, RenderError> {
        let (request, generation) = {
            let mut st = self.state();
            if st.options.reset_on_markup_change {
                let current = self.markup_source(&st).revision();
                if st.strategies.markup_revision().is_some_and(|seen| seen != current) {
                    st.strategies.reset();
                    tracing::debug!(template = self.inner.id, "markup changed, strategy reset");
                    self.publish(Event::new(EventKind::StrategyReset));
                }
            }
            if let StrategyState::Resolved(f) = st.strategies.get(target) {
                return Ok(f.clone());
            }

            let generation = st.strategies.generation();
            if let Some(reason) = ineligibility(&st.options, st.href.as_ref()) {
                tracing::warn!(template = self.inner.id, reason, "cannot compile template, interpreting");
                st.strategies.store(target, RenderFn::Interpreted, generation);
                drop(st);
                self.publish(Event::new(EventKind::StrategyFallback).with_reason(reason));
                self.publish(Event::new(EventKind::StrategyResolved).with_tag("interpreted"));
                return Ok(RenderFn::Interpreted);
            }

            let request = CompileRequest {
                template: self.inner.id,
                target,
                source: self.markup_source(&st),
                extract_child: st.options.extract_child,
                enable_recycling: st.options.enable_recycling,
                debug_break_on_render: st.options.debug_break_on_render || debug_break_on_render(),
                plan: self.plan(&st),
            };
            (request, generation)
        };

        let revision = request.source.revision();
        let compiled = self
            .inner
            .services
            .compiler()
            .compile(request)
            .map_err(RenderError::into_strategy_construction)?;
        let f = RenderFn::Compiled(compiled);
        {
            let mut st = self.state();
            if st.strategies.store(target, f.clone(), generation) && st.options.reset_on_markup_change {
                st.strategies.set_markup_revision(revision);
            }
        }
        self.publish(Event::new(EventKind::StrategyResolved).with_tag("compiled"));
        Ok(f)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("id", &self.inner.id)
            .field("element", &self.inner.element)
            .finish_non_exhaustive()
    }
}
