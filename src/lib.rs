//! # bindery
//!
//! **Bindery** renders reusable markup templates against data, applies
//! declarative bindings and nested controls, and hands back cancellable
//! handles for the work.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Template   │   │   Template   │   │  WorkQueue   │
//!     │  (render)    │   │(render_item) │   │ (N in flight)│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  │ enqueue(|| template.render(..))
//! ┌────────────────────────────────────────────┐   │
//! │  Strategy selector (memoized per target)   │◄──┘
//! │  - Compiled   ─► TemplateCompiler          │
//! │  - Interpreted ─► interpreted::render      │
//! │  - RenderItem ─► recycling (BindingCache)  │
//! └──────┬─────────────────────────────────────┘
//!        ▼
//! ┌────────────────────────────────────────────┐
//! │  Services (collaborator seams)             │
//! │  FragmentResolver · ControlInstantiator    │
//! │  BindingProcessor · Scheduler · Bus        │
//! └──────┬─────────────────────────────────────┘
//!        │ publish(Event)
//!        ▼
//!   Bus (broadcast) ──► subscriber_listener ──► SubscriberSet ──► workers
//! ```
//!
//! ### Render lifecycle
//! ```text
//! render(data, container?)
//!   ├─► RenderStarting
//!   ├─► attach markup (spawned) ──► subtree resolves ──► SubtreeAttached
//!   ├─► scope boundaries ─► delay ─► controls ─► data ─► bindings
//!   └─► complete resolves ──► RenderCompleted
//!             on error:  teardown once ─► RenderFailed | RenderCanceled
//! ```
//!
//! ## Features
//! | Area              | Description                                             | Key types / traits                 |
//! |-------------------|---------------------------------------------------------|------------------------------------|
//! | **Templates**     | Render data into markup with a memoized strategy.       | [`Template`], [`RenderOptions`]    |
//! | **Recycling**     | Reuse earlier item output when it is safe.              | [`BindingCache`], [`Item`]         |
//! | **Work**          | Shareable, cancellable handles to spawned work.         | [`Work`], [`Pending`]              |
//! | **Queue**         | Bounded-concurrency queue with reordering.              | [`WorkQueue`]                      |
//! | **Collaborators** | Pluggable fragment, binding, control and compile seams. | [`Services`], [`ServicesBuilder`]  |
//! | **Subscriber API**| Hook into render lifecycle events.                      | [`Subscribe`]                      |
//! | **Errors**        | One typed error for every failure.                      | [`RenderError`]                    |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use bindery::{Node, Pending, Services, Template, WorkQueue};
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), bindery::RenderError> {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn bindery::Subscribe>> = vec![Arc::new(bindery::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn bindery::Subscribe>> = Vec::new();
//!
//!     let services = Services::builder().with_subscribers(subs).build();
//!
//!     let markup = Node::new("li");
//!     let label = Node::new("span");
//!     label.set_attribute("data-bind", "text: name");
//!     markup.append_child(&label);
//!     let template = Template::new(Some(markup), services.clone());
//!
//!     let queue: WorkQueue<usize> = WorkQueue::from_services(2, &services);
//!     let mut handles = Vec::new();
//!     for (i, name) in ["ada", "grace", "barbara"].into_iter().enumerate() {
//!         let template = template.clone();
//!         handles.push(queue.enqueue(
//!             move || Ok(template.render(Pending::Ready(json!({ "name": name })), None).complete),
//!             i,
//!             false,
//!         ));
//!     }
//!     for handle in handles {
//!         let _node = handle.await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod collab;
pub mod dom;
mod error;
pub mod events;
pub mod input;
pub mod queue;
pub mod subscribers;
pub mod task;
pub mod template;

// ---- Public re-exports ----

pub use collab::{
    BindingInitializer, BindingProcessor, ControlInstantiator, DataValue, FragmentLoader,
    FragmentResolver, MarkupRef, TemplateCompiler,
};
pub use dom::{Node, NodeId, TemplateId};
pub use error::RenderError;
pub use events::{Bus, Event, EventKind};
pub use queue::WorkQueue;
pub use subscribers::{Subscribe, SubscriberSet};
pub use task::{Outcome, Pending, Priority, Scheduler, TokioScheduler, Work};
pub use template::{
    BindingCache, Item, RenderDelay, RenderOptions, RenderResult, Services, ServicesBuilder,
    Template,
};

// Optional: expose a simple built-in logger subscriber.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
