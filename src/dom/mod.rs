//! # Minimal document tree.
//!
//! Templates render into [`Node`] trees. A node is a cheap, shared handle:
//! cloning it clones the handle, never the subtree (use [`Node::deep_clone`]).
//!
//! Besides structure, a node carries the render bookkeeping the engine needs:
//! dispose hooks, active binding tokens, the attached control, the origin
//! template stamp used by recycling, and a subtree mutation revision.

mod node;

pub use node::{DisposeHook, HookId, Node, NodeId, TemplateId, WeakNode};
