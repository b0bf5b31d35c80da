//! # Per-template binding cache.
//!
//! Two stores live here:
//! - **expressions**: parsed `data-bind` sources, shared by every render of
//!   the template;
//! - **elements**: one [`CacheEntry`] per recyclable subtree root. This store
//!   only exists once recycling has been enabled, so a template that never
//!   recycles never accumulates entries.
//!
//! ## Rules
//! - `track` and `mark_unsafe` are no-ops until elements are enabled.
//! - `unsafe_to_reuse` is sticky: a refused entry is discarded, never cleared.
//! - An entry lives no longer than its node: creating it registers a dispose
//!   hook that runs the pending teardowns and removes it.
//! - Teardowns and node hooks run outside the cache lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::collab::BindingExpressions;
use crate::dom::{DisposeHook, Node, NodeId};
use crate::error::RenderError;

/// Callback that stops one active binding.
pub type Teardown = Box<dyn FnOnce() + Send + 'static>;

/// Recycling record for one subtree root.
#[derive(Default)]
pub struct CacheEntry {
    teardowns: Vec<Teardown>,
    unsafe_to_reuse: bool,
}

impl CacheEntry {
    /// Number of pending teardowns.
    pub fn teardown_count(&self) -> usize {
        self.teardowns.len()
    }

    /// True once any binding on the subtree was found non-cancelable.
    pub fn is_unsafe(&self) -> bool {
        self.unsafe_to_reuse
    }
}

type Elements = Mutex<Option<HashMap<NodeId, CacheEntry>>>;

/// Expression memo plus the lazily created recycling store.
#[derive(Default)]
pub struct BindingCache {
    expressions: Mutex<HashMap<String, Arc<BindingExpressions>>>,
    elements: Arc<Elements>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BindingCache {
    /// Returns the parsed expressions for `source`, parsing on first use.
    ///
    /// Parse failures are not cached.
    pub fn expressions_for<F>(&self, source: &str, parse: F) -> Result<Arc<BindingExpressions>, RenderError>
    where
        F: FnOnce(&str) -> Result<BindingExpressions, RenderError>,
    {
        if let Some(hit) = lock(&self.expressions).get(source) {
            return Ok(Arc::clone(hit));
        }
        let parsed = Arc::new(parse(source)?);
        Ok(Arc::clone(
            lock(&self.expressions)
                .entry(source.to_string())
                .or_insert(parsed),
        ))
    }

    /// Number of memoized expression sources.
    pub fn expression_count(&self) -> usize {
        lock(&self.expressions).len()
    }

    /// Creates the element store if it does not exist yet.
    pub fn enable_elements(&self) {
        lock(&self.elements).get_or_insert_with(HashMap::new);
    }

    /// True once the element store exists.
    pub fn elements_enabled(&self) -> bool {
        lock(&self.elements).is_some()
    }

    /// Records a teardown for a binding established under `root`.
    pub fn track(&self, root: &Node, teardown: Teardown) {
        self.with_entry(root, |entry| entry.teardowns.push(teardown));
    }

    /// Flags `root` as unsafe to recycle.
    pub fn mark_unsafe(&self, root: &Node) {
        self.with_entry(root, |entry| entry.unsafe_to_reuse = true);
    }

    fn with_entry(&self, root: &Node, f: impl FnOnce(&mut CacheEntry)) {
        let created = {
            let mut guard = lock(&self.elements);
            let Some(elements) = guard.as_mut() else {
                return;
            };
            let created = !elements.contains_key(&root.id());
            f(elements.entry(root.id()).or_default());
            created
        };
        if created {
            root.mark_disposable(evict_on_dispose(&self.elements, root.id()));
        }
    }

    /// Number of entries in the element store.
    pub fn entry_count(&self) -> usize {
        lock(&self.elements).as_ref().map_or(0, HashMap::len)
    }

    /// True if the entry for `id` exists and is flagged unsafe.
    pub fn is_unsafe(&self, id: NodeId) -> bool {
        lock(&self.elements)
            .as_ref()
            .and_then(|e| e.get(&id))
            .is_some_and(CacheEntry::is_unsafe)
    }

    /// Pending teardowns for `id` (0 without an entry).
    pub fn teardown_count(&self, id: NodeId) -> usize {
        lock(&self.elements)
            .as_ref()
            .and_then(|e| e.get(&id))
            .map_or(0, CacheEntry::teardown_count)
    }

    /// Prepares `id` for reuse: runs and clears its teardowns, then reports
    /// whether the subtree may be reused. A refused entry is discarded.
    ///
    /// Without an entry the subtree has no live bindings and is reusable.
    pub fn recycle(&self, id: NodeId) -> bool {
        let (teardowns, reusable) = {
            let mut guard = lock(&self.elements);
            let Some(elements) = guard.as_mut() else {
                return true;
            };
            if elements.get(&id).is_some_and(CacheEntry::is_unsafe) {
                let entry = elements.remove(&id).unwrap_or_default();
                (entry.teardowns, false)
            } else {
                let teardowns = elements
                    .get_mut(&id)
                    .map(|entry| std::mem::take(&mut entry.teardowns))
                    .unwrap_or_default();
                (teardowns, true)
            }
        };
        for teardown in teardowns {
            teardown();
        }
        reusable
    }
}

/// Dispose hook that drops the entry for `id` and runs what it still tracked.
fn evict_on_dispose(elements: &Arc<Elements>, id: NodeId) -> DisposeHook {
    let elements = Arc::downgrade(elements);
    Box::new(move || {
        let Some(elements) = elements.upgrade() else {
            return;
        };
        let entry = lock(&elements).as_mut().and_then(|e| e.remove(&id));
        for teardown in entry.into_iter().flat_map(|e| e.teardowns) {
            teardown();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn tracking_requires_enabled_elements() {
        let cache = BindingCache::default();
        let node = Node::new("div");
        cache.track(&node, Box::new(|| {}));
        cache.mark_unsafe(&node);
        assert!(!cache.elements_enabled());
        assert_eq!(cache.teardown_count(node.id()), 0);
        assert!(!cache.is_unsafe(node.id()));
    }

    #[test]
    fn recycle_runs_teardowns_before_refusing() {
        let ran = Arc::new(AtomicUsize::new(0));
        let cache = BindingCache::default();
        cache.enable_elements();
        let node = Node::new("div");
        for _ in 0..2 {
            let r = Arc::clone(&ran);
            cache.track(&node, Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(cache.recycle(node.id()));
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(cache.teardown_count(node.id()), 0);

        let r = Arc::clone(&ran);
        cache.track(&node, Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        cache.mark_unsafe(&node);
        assert!(cache.is_unsafe(node.id()));
        assert!(!cache.recycle(node.id()));
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert!(!cache.is_unsafe(node.id()));
        assert_eq!(cache.entry_count(), 0, "refused entry is discarded");
    }

    #[test]
    fn disposing_a_node_evicts_its_entry() {
        let ran = Arc::new(AtomicUsize::new(0));
        let cache = BindingCache::default();
        cache.enable_elements();
        let nodes: Vec<Node> = (0..3).map(|_| Node::new("div")).collect();
        for node in &nodes {
            let r = Arc::clone(&ran);
            cache.track(node, Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }));
            cache.track(node, Box::new(|| {}));
            assert_eq!(node.hook_count(), 1);
        }
        assert_eq!(cache.entry_count(), 3);

        nodes[0].dispose();
        assert_eq!(cache.entry_count(), 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let late = Node::new("div");
        late.dispose();
        cache.track(&late, Box::new(|| {}));
        assert_eq!(cache.entry_count(), 2, "a disposed node never keeps an entry");
    }

    #[test]
    fn expressions_are_parsed_once() {
        let cache = BindingCache::default();
        let parses = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .expressions_for("text: a", |s| {
                    parses.fetch_add(1, Ordering::SeqCst);
                    BindingExpressions::parse(s)
                })
                .expect("parse");
        }
        assert_eq!(parses.load(Ordering::SeqCst), 1);
        assert_eq!(cache.expression_count(), 1);
    }
}
