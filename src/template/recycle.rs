//! # Item rendering with subtree recycling.
//!
//! ```text
//! render_item(item, recycled?)
//!   recycling on ──► create the element store (first time only)
//!   recycled given?
//!     ├─ recycling off              ──► RecycleRefused
//!     ├─ origin != this template    ──► RecycleRefused
//!     ├─ cache.recycle(id) == false ──► RecycleRefused   (teardowns ran, entry
//!     │                                                   and origin dropped)
//!     └─ otherwise                  ──► RecycleHit ──► rebind in place
//!                                        (failure: dispose the node)
//!   fresh render of item.data, owner stamped with the template id
//! ```

use super::interpreted::{self, RenderPlan};
use super::{Item, RenderResult};
use crate::dom::Node;
use crate::events::{Event, EventKind};
use crate::task::Pending;

/// Why `node` cannot be reused, or `None` when it can.
///
/// Teardowns of a known entry always run before its safety is checked.
fn refusal(plan: &RenderPlan, recycling: bool, node: &Node) -> Option<&'static str> {
    if !recycling {
        return Some("recycling is disabled");
    }
    if node.origin() != Some(plan.template) {
        return Some("node was not produced by this template");
    }
    if !plan.cache.recycle(node.id()) {
        node.clear_origin();
        return Some("a binding on the subtree cannot be torn down");
    }
    None
}

pub(crate) fn render_item(
    plan: RenderPlan,
    recycling: bool,
    item: Pending<Item>,
    recycled: Option<Node>,
) -> RenderResult {
    if recycling {
        plan.cache.enable_elements();
    }

    if let Some(node) = recycled {
        let bus = plan.services.bus();
        match refusal(&plan, recycling, &node) {
            None => {
                bus.publish(
                    Event::new(EventKind::RecycleHit)
                        .with_template(plan.template)
                        .with_node(node.id()),
                );
                return interpreted::render_recycled(plan, item, node);
            }
            Some(reason) => {
                tracing::debug!(template = plan.template, node = node.id(), reason, "recycle refused");
                bus.publish(
                    Event::new(EventKind::RecycleRefused)
                        .with_template(plan.template)
                        .with_node(node.id())
                        .with_reason(reason),
                );
            }
        }
    }

    let mut plan = plan;
    plan.stamp_origin = true;
    interpreted::render(plan, item.map(|i| i.data), None)
}
