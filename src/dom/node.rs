//! Shared document-tree node.
//!
//! ## Rules
//! - A node has at most one parent; `append_child` moves a child that already
//!   has one.
//! - `dispose` is idempotent: hooks run once, bindings are cancelled once, the
//!   control is disposed once, then every child is disposed.
//! - Child, attribute, class and text changes stamp the node and all of its
//!   ancestors with a fresh global revision.
//! - The state lock is never held while hooks, controls or other nodes run.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::collab::Control;

/// Process-unique node identity.
pub type NodeId = u64;
/// Handle of a registered dispose hook.
pub type HookId = u64;
/// Identity of the template that produced a node.
pub type TemplateId = u64;
/// Callback run when a node is disposed.
pub type DisposeHook = Box<dyn FnOnce() + Send + 'static>;

static NODE_IDS: AtomicU64 = AtomicU64::new(1);
static HOOK_IDS: AtomicU64 = AtomicU64::new(1);
static REVISIONS: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct NodeState {
    parent: Weak<NodeData>,
    children: Vec<Node>,
    attributes: BTreeMap<String, String>,
    classes: Vec<String>,
    properties: BTreeMap<String, Value>,
    text: Option<String>,
    scope_boundary: bool,
    origin: Option<TemplateId>,
    hooks: Vec<(HookId, DisposeHook)>,
    bindings: Vec<CancellationToken>,
    control: Option<Arc<dyn Control>>,
}

struct NodeData {
    id: NodeId,
    tag: String,
    state: Mutex<NodeState>,
    disposed: AtomicBool,
    revision: AtomicU64,
}

/// Shared handle to a document-tree node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeData>,
}

/// Non-owning handle to a [`Node`], used by hooks that must not keep their
/// own node alive.
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeData>,
}

impl WeakNode {
    /// Upgrades to a strong handle while the node is still alive.
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

impl Node {
    /// Creates a detached element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(NodeData {
                id: NODE_IDS.fetch_add(1, Ordering::Relaxed),
                tag: tag.into(),
                state: Mutex::new(NodeState::default()),
                disposed: AtomicBool::new(false),
                revision: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a detached element holding `text`.
    pub fn text_node(tag: impl Into<String>, text: impl Into<String>) -> Self {
        let node = Self::new(tag);
        node.state().text = Some(text.into());
        node
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stable identity.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Element tag.
    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    /// Non-owning handle to this node.
    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// True when both handles point at the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // === Structure ===

    /// Current parent, if attached.
    pub fn parent(&self) -> Option<Node> {
        self.state().parent.upgrade().map(|inner| Node { inner })
    }

    /// Appends `child` as the last child, detaching it from its old parent first.
    ///
    /// Appending a node to itself is ignored.
    pub fn append_child(&self, child: &Node) {
        if self.ptr_eq(child) {
            return;
        }
        if let Some(old) = child.parent() {
            old.remove_child(child);
        }
        child.state().parent = Arc::downgrade(&self.inner);
        self.state().children.push(child.clone());
        self.touch();
    }

    /// Removes `child`; returns false when it was not a child of this node.
    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut st = self.state();
            let before = st.children.len();
            st.children.retain(|c| !c.ptr_eq(child));
            before != st.children.len()
        };
        if removed {
            child.state().parent = Weak::new();
            self.touch();
        }
        removed
    }

    /// Snapshot of the current children.
    pub fn children(&self) -> Vec<Node> {
        self.state().children.clone()
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.state().children.len()
    }

    /// First child, if any.
    pub fn first_child(&self) -> Option<Node> {
        self.state().children.first().cloned()
    }

    /// Child at `index`, if any.
    pub fn child_at(&self, index: usize) -> Option<Node> {
        self.state().children.get(index).cloned()
    }

    /// This node followed by all of its descendants, depth first.
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let children = node.children();
            out.push(node);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Structural copy: tag, attributes, classes, properties, text and
    /// children. Hooks, bindings, controls, flags and origin are not copied.
    pub fn deep_clone(&self) -> Node {
        let copy = Node::new(self.tag());
        let children = {
            let src = self.state();
            let mut dst = copy.state();
            dst.attributes = src.attributes.clone();
            dst.classes = src.classes.clone();
            dst.properties = src.properties.clone();
            dst.text = src.text.clone();
            src.children.clone()
        };
        for child in children {
            let c = child.deep_clone();
            c.state().parent = Arc::downgrade(&copy.inner);
            copy.state().children.push(c);
        }
        copy
    }

    // === Attributes, classes, properties, text ===

    /// Attribute value.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.state().attributes.get(name).cloned()
    }

    /// Sets an attribute.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state().attributes.insert(name.into(), value.into());
        self.touch();
    }

    /// Removes an attribute, returning its old value.
    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        let old = self.state().attributes.remove(name);
        if old.is_some() {
            self.touch();
        }
        old
    }

    /// Adds a class unless already present.
    pub fn add_class(&self, class: &str) {
        let added = {
            let mut st = self.state();
            if st.classes.iter().any(|c| c == class) {
                false
            } else {
                st.classes.push(class.to_string());
                true
            }
        };
        if added {
            self.touch();
        }
    }

    /// Removes a class if present.
    pub fn remove_class(&self, class: &str) {
        let removed = {
            let mut st = self.state();
            let before = st.classes.len();
            st.classes.retain(|c| c != class);
            before != st.classes.len()
        };
        if removed {
            self.touch();
        }
    }

    /// True when the class is present.
    pub fn has_class(&self, class: &str) -> bool {
        self.state().classes.iter().any(|c| c == class)
    }

    /// Bound property value. Properties are not structural.
    pub fn property(&self, name: &str) -> Option<Value> {
        self.state().properties.get(name).cloned()
    }

    /// Sets a bound property.
    pub fn set_property(&self, name: impl Into<String>, value: Value) {
        self.state().properties.insert(name.into(), value);
    }

    /// Text content of this node (not of its descendants).
    pub fn text(&self) -> Option<String> {
        self.state().text.clone()
    }

    /// Replaces the text content.
    pub fn set_text(&self, text: impl Into<String>) {
        self.state().text = Some(text.into());
        self.touch();
    }

    // === Render bookkeeping ===

    /// Marks the node as sitting inside a navigation scope boundary.
    pub fn set_scope_boundary(&self, on: bool) {
        self.state().scope_boundary = on;
    }

    /// Scope boundary flag.
    pub fn is_scope_boundary(&self) -> bool {
        self.state().scope_boundary
    }

    /// Template that produced this node, if stamped.
    pub fn origin(&self) -> Option<TemplateId> {
        self.state().origin
    }

    /// Stamps the producing template.
    pub fn set_origin(&self, template: TemplateId) {
        self.state().origin = Some(template);
    }

    /// Removes the origin stamp; no template will recycle the node afterwards.
    pub fn clear_origin(&self) {
        self.state().origin = None;
    }

    /// Registers a hook run when the node is disposed.
    ///
    /// On an already disposed node the hook runs immediately.
    pub fn mark_disposable(&self, hook: DisposeHook) -> HookId {
        let id = HOOK_IDS.fetch_add(1, Ordering::Relaxed);
        if self.is_disposed() {
            hook();
            return id;
        }
        self.state().hooks.push((id, hook));
        id
    }

    /// Runs one hook now and detaches it. Returns false if it was already gone.
    pub fn release_hook(&self, id: HookId) -> bool {
        let hook = {
            let mut st = self.state();
            st.hooks
                .iter()
                .position(|(h, _)| *h == id)
                .map(|i| st.hooks.remove(i).1)
        };
        match hook {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }

    /// Detaches one hook without running it. Returns false if it was already gone.
    pub fn forget_hook(&self, id: HookId) -> bool {
        let mut st = self.state();
        let before = st.hooks.len();
        st.hooks.retain(|(h, _)| *h != id);
        st.hooks.len() != before
    }

    /// Number of hooks still registered.
    pub fn hook_count(&self) -> usize {
        self.state().hooks.len()
    }

    /// Disposes the node and its subtree. Only the first call has any effect.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let (hooks, bindings, control, children) = {
            let mut st = self.state();
            (
                std::mem::take(&mut st.hooks),
                std::mem::take(&mut st.bindings),
                st.control.take(),
                st.children.clone(),
            )
        };
        tracing::trace!(node = self.id(), hooks = hooks.len(), "dispose");
        for (_, hook) in hooks {
            hook();
        }
        for token in bindings {
            token.cancel();
        }
        if let Some(control) = control {
            control.dispose();
        }
        for child in children {
            child.dispose();
        }
    }

    /// True once [`Node::dispose`] ran.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Registers an active binding; cancelled by [`Node::cancel_bindings`] or disposal.
    pub fn add_binding(&self, token: CancellationToken) {
        if self.is_disposed() {
            token.cancel();
            return;
        }
        self.state().bindings.push(token);
    }

    /// Cancels and forgets every registered binding. Returns how many there were.
    pub fn cancel_bindings(&self) -> usize {
        let bindings = std::mem::take(&mut self.state().bindings);
        for token in &bindings {
            token.cancel();
        }
        bindings.len()
    }

    /// Number of registered (not yet cancelled) bindings.
    pub fn binding_count(&self) -> usize {
        self.state().bindings.len()
    }

    /// Attaches a control instance.
    pub fn set_control(&self, control: Arc<dyn Control>) {
        self.state().control = Some(control);
    }

    /// Attached control, if any.
    pub fn control(&self) -> Option<Arc<dyn Control>> {
        self.state().control.clone()
    }

    /// Last structural mutation stamp anywhere in this subtree (0 if never mutated).
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    fn touch(&self) {
        let stamp = REVISIONS.fetch_add(1, Ordering::Relaxed);
        let mut cur = Some(self.clone());
        while let Some(node) = cur {
            node.inner.revision.store(stamp, Ordering::Release);
            cur = node.parent();
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
