//! # Interpreted render pipeline.
//!
//! One call to [`render`] spawns two stages that share a render token:
//!
//! ```text
//! render(plan, data, container?)
//!   │  container ← supplied or fresh <tag>; + "win-template" "win-loading"
//!   │  initial   ← container.child_count()
//!   │
//!   ├─► attach stage ──────────────► subtree: Work<Node>
//!   │     copy markup (resolver or snapshot), extract first child if asked,
//!   │     register the dispose hook on the owner, capture the WorkUnit
//!   │
//!   └─► process stage ─────────────► complete: Work<Node>
//!         wait subtree → scope boundary → delay → controls → data (blocker)
//!         → bindings → owner
//!         any failure: teardown, then re-raise
//! ```
//!
//! ## Work units
//! - `initial == 0` → [`WorkUnit::Root`]: the owner itself
//! - one node added → [`WorkUnit::Single`]: that node
//! - otherwise      → [`WorkUnit::Many`]: the added nodes, captured before
//!   any processing so later sibling mutations don't change the set
//!
//! ## Rules
//! - Controls for the whole unit finish before the data context is awaited,
//!   and the data context before any binding starts.
//! - `complete` never settles before `subtree`.
//! - Teardown happens at most once per render; disposal is idempotent anyway.
//! - A supplied container is never disposed and keeps its own bindings: only
//!   this render's hook is released and only the nodes it added are disposed.
//!   After a successful render the hook is forgotten.
//! - A failed recycled rebind runs the node's teardowns, then disposes it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;

use super::{BindingCache, Item, RenderDelay, RenderResult, Services};
use crate::collab::{BindRequest, BindingInitializer, DataValue, MarkupRef};
use crate::dom::{DisposeHook, HookId, Node, TemplateId};
use crate::error::RenderError;
use crate::events::{Event, EventKind};
use crate::task::{Outcome, Pending, Work, next_turn};

/// Class added to every render container.
pub const TEMPLATE_CLASS: &str = "win-template";
/// Class present on a container while its render is in flight.
pub const LOADING_CLASS: &str = "win-loading";

/// Where the pipeline copies markup from.
#[derive(Clone, Debug)]
pub(crate) enum Markup {
    /// Ask the fragment resolver on every render.
    Resolve(MarkupRef),
    /// Clone the children of a frozen copy.
    Snapshot(Node),
}

/// Everything one render needs, captured when the call is made.
#[derive(Clone)]
pub(crate) struct RenderPlan {
    pub(crate) template: TemplateId,
    pub(crate) tag: String,
    pub(crate) markup: Markup,
    pub(crate) extract_child: bool,
    pub(crate) delay: RenderDelay,
    pub(crate) initializer: Option<BindingInitializer>,
    pub(crate) debug_break: bool,
    pub(crate) stamp_origin: bool,
    pub(crate) counter: Arc<AtomicU64>,
    pub(crate) cache: Arc<BindingCache>,
    pub(crate) services: Services,
}

/// Nodes that control instantiation and binding run over.
#[derive(Clone, Debug)]
pub(crate) enum WorkUnit {
    Root(Node),
    Single(Node),
    Many(Vec<Node>),
}

impl WorkUnit {
    fn capture(owner: &Node, added: &[Node], initial: usize) -> Self {
        match (initial, added) {
            (0, _) => WorkUnit::Root(owner.clone()),
            (_, [only]) => WorkUnit::Single(only.clone()),
            (_, nodes) => WorkUnit::Many(nodes.to_vec()),
        }
    }

    /// Runs `f` on the unit; the many-node case fans out and joins.
    async fn run<F, Fut>(&self, f: F) -> Outcome<()>
    where
        F: Fn(Node) -> Fut,
        Fut: Future<Output = Outcome<()>>,
    {
        match self {
            WorkUnit::Root(node) | WorkUnit::Single(node) => f(node.clone()).await,
            WorkUnit::Many(nodes) => try_join_all(nodes.iter().cloned().map(&f))
                .await
                .map(|_| ()),
        }
    }
}

/// Result of the attach stage.
#[derive(Clone, Debug)]
struct Attached {
    owner: Node,
    hook: HookId,
    extracted: bool,
    root_scope: bool,
    added: Vec<Node>,
    unit: WorkUnit,
}

/// Races `fut` against `token`.
async fn guarded<T, F>(token: &CancellationToken, fut: F) -> Outcome<T>
where
    F: Future<Output = Outcome<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RenderError::Canceled),
        out = fut => out,
    }
}

/// Hook that cancels the render. `owned` is set only for an owner this render
/// created; a supplied container keeps its own bindings.
fn dispose_hook(owned: Option<&Node>, token: &CancellationToken) -> DisposeHook {
    let owned = owned.map(Node::downgrade);
    let token = token.clone();
    Box::new(move || {
        if let Some(owner) = owned.as_ref().and_then(|w| w.upgrade()) {
            owner.cancel_bindings();
        }
        token.cancel();
    })
}

/// Undoes what one render attached.
fn teardown(container: &Node, owner: &Node, supplied: bool, extracted: bool, hook: HookId, added: &[Node]) {
    if extracted || !supplied {
        owner.dispose();
        return;
    }
    container.release_hook(hook);
    for node in added {
        node.dispose();
    }
}

async fn copy_markup(plan: &RenderPlan, target: Node, token: CancellationToken) -> Outcome<Node> {
    match &plan.markup {
        Markup::Resolve(source) => plan.services.resolver().render_copy(source, target, token).await,
        Markup::Snapshot(frozen) => {
            for child in frozen.children() {
                target.append_child(&child.deep_clone());
            }
            Ok(target)
        }
    }
}

fn publish_outcome(plan: &RenderPlan, out: &Outcome<Node>) {
    let ev = match out {
        Ok(node) => Event::new(EventKind::RenderCompleted).with_node(node.id()),
        Err(RenderError::Canceled) => Event::new(EventKind::RenderCanceled),
        Err(e) => Event::new(EventKind::RenderFailed).with_reason(e.to_string()),
    };
    plan.services.bus().publish(ev.with_template(plan.template));
}

/// Renders `data` into `container` (or a fresh element).
pub(crate) fn render(plan: RenderPlan, data: Pending<DataValue>, container: Option<Node>) -> RenderResult {
    if plan.counter.fetch_add(1, Ordering::Relaxed) == 0 && plan.debug_break {
        tracing::info!(template = plan.template, "first render of a template marked debug_break_on_render");
        plan.services
            .bus()
            .publish(Event::new(EventKind::DebugBreak).with_template(plan.template));
    }

    let supplied = container.is_some();
    let container = container.unwrap_or_else(|| Node::new(plan.tag.as_str()));
    container.add_class(TEMPLATE_CLASS);
    container.add_class(LOADING_CLASS);
    let initial = container.child_count();
    let token = CancellationToken::new();

    let mut starting = Event::new(EventKind::RenderStarting)
        .with_template(plan.template)
        .with_node(container.id());
    if let RenderDelay::After(d) = plan.delay {
        starting = starting.with_delay(d);
    }
    plan.services.bus().publish(starting);

    let plan = Arc::new(plan);
    let attached = Work::spawn(
        token.clone(),
        attach(Arc::clone(&plan), container.clone(), supplied, initial, token.clone()),
    );
    let subtree = attached.map(|a: Attached| a.owner);
    let complete = Work::spawn(
        token.clone(),
        process(plan, attached, subtree.clone(), container, supplied, data, token),
    );
    RenderResult { subtree, complete }
}

async fn attach(
    plan: Arc<RenderPlan>,
    container: Node,
    supplied: bool,
    initial: usize,
    token: CancellationToken,
) -> Outcome<Attached> {
    let (owner, hook, extracted) = if plan.extract_child {
        let scratch = Node::new(plan.tag.as_str());
        let fragment = guarded(&token, copy_markup(&plan, scratch, token.child_token())).await?;
        let child = fragment
            .first_child()
            .ok_or_else(|| RenderError::structural("extract_child is set but the markup has no child"))?;
        let hook = child.mark_disposable(dispose_hook(Some(&child), &token));
        container.append_child(&child);
        (child, hook, true)
    } else {
        let owned = (!supplied).then_some(&container);
        let hook = container.mark_disposable(dispose_hook(owned, &token));
        if let Err(e) = guarded(&token, copy_markup(&plan, container.clone(), token.child_token())).await {
            let added: Vec<Node> = container.children().into_iter().skip(initial).collect();
            teardown(&container, &container, supplied, false, hook, &added);
            return Err(e);
        }
        (container.clone(), hook, false)
    };

    if plan.stamp_origin {
        owner.set_origin(plan.template);
    }
    let added: Vec<Node> = container.children().into_iter().skip(initial).collect();
    let unit = WorkUnit::capture(&owner, &added, initial);
    tracing::trace!(template = plan.template, owner = owner.id(), added = added.len(), "markup attached");
    plan.services.bus().publish(
        Event::new(EventKind::SubtreeAttached)
            .with_template(plan.template)
            .with_node(owner.id()),
    );
    Ok(Attached {
        owner,
        hook,
        extracted,
        root_scope: !extracted && initial == 0,
        added,
        unit,
    })
}

async fn process(
    plan: Arc<RenderPlan>,
    attached: Work<Attached>,
    subtree: Work<Node>,
    container: Node,
    supplied: bool,
    data: Pending<DataValue>,
    token: CancellationToken,
) -> Outcome<Node> {
    let out = match attached.wait().await {
        Err(e) => Err(e),
        Ok(a) => {
            // `complete` must not settle before `subtree`.
            let _ = subtree.wait().await;
            let out = run_stages(&plan, &a, &container, data, &token).await;
            match &out {
                Err(_) => teardown(&container, &a.owner, supplied, a.extracted, a.hook, &a.added),
                Ok(_) if supplied && !a.extracted => {
                    container.forget_hook(a.hook);
                }
                Ok(_) => {}
            }
            out
        }
    };
    container.remove_class(LOADING_CLASS);
    publish_outcome(&plan, &out);
    out
}

async fn run_stages(
    plan: &RenderPlan,
    a: &Attached,
    container: &Node,
    data: Pending<DataValue>,
    token: &CancellationToken,
) -> Outcome<Node> {
    for child in container.children() {
        child.set_scope_boundary(true);
    }

    let scheduler = plan.services.scheduler().as_ref();
    match plan.delay {
        RenderDelay::None => {}
        RenderDelay::Yield => {
            guarded(token, async {
                next_turn(scheduler, None, "render-delay").await;
                Ok(())
            })
            .await?
        }
        RenderDelay::After(d) => {
            guarded(token, async {
                next_turn(scheduler, Some(d), "render-delay").await;
                Ok(())
            })
            .await?
        }
    }
    if token.is_cancelled() {
        return Err(RenderError::Canceled);
    }

    let controls = plan.services.controls();
    guarded(
        token,
        a.unit.run(|node| {
            let controls = Arc::clone(controls);
            let t = token.child_token();
            async move { controls.instantiate(node, t).await }
        }),
    )
    .await?;

    let data = data.resolve_blocked(token).await?;

    let binder = plan.services.binder();
    let request = BindRequest {
        data,
        root_scope: a.root_scope,
        cache: Arc::clone(&plan.cache),
        initializer: plan.initializer.clone(),
    };
    guarded(
        token,
        a.unit.run(|node| {
            let binder = Arc::clone(binder);
            let request = request.clone();
            let t = token.child_token();
            async move { binder.apply(node, request, t).await.map(|_| ()) }
        }),
    )
    .await?;

    Ok(a.owner.clone())
}

/// Rebinds a recycled subtree to a new item: no markup work, no controls.
pub(crate) fn render_recycled(plan: RenderPlan, item: Pending<Item>, node: Node) -> RenderResult {
    let token = CancellationToken::new();
    let subtree = Work::ready(node.clone());
    let guard = token.clone();
    let complete = Work::spawn(token, async move {
        let out: Outcome<Node> = async {
            let item = item.resolve_blocked(&guard).await?;
            let request = BindRequest {
                data: item.data,
                root_scope: false,
                cache: Arc::clone(&plan.cache),
                initializer: plan.initializer.clone(),
            };
            let binder = Arc::clone(plan.services.binder());
            guarded(&guard, binder.apply(node.clone(), request, guard.child_token())).await?;
            Ok(node.clone())
        }
        .await;
        if out.is_err() {
            // Disposal evicts the cache entry and runs its teardowns.
            node.dispose();
        }
        publish_outcome(&plan, &out);
        out
    });
    RenderResult { subtree, complete }
}
