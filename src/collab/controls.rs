//! Nested control instantiation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::dom::Node;
use crate::error::RenderError;

/// Attribute read by [`ControlRegistry`].
pub const CONTROL_ATTR: &str = "data-control";

/// A control attached to a node.
pub trait Control: Send + Sync + 'static {
    /// Registered control name.
    fn name(&self) -> &str;

    /// Called once when the hosting node is disposed.
    fn dispose(&self) {}
}

/// Instantiates nested controls inside rendered markup.
#[async_trait]
pub trait ControlInstantiator: Send + Sync + 'static {
    /// Processes `root` and its subtree.
    async fn instantiate(&self, root: Node, token: CancellationToken) -> Result<(), RenderError>;
}

/// Builds a control for a node.
pub type ControlFactory = Arc<dyn Fn(&Node) -> Result<Arc<dyn Control>, RenderError> + Send + Sync>;

/// Reference [`ControlInstantiator`]: maps `data-control` names to factories.
///
/// Nodes that already host a control are left alone, so processing the same
/// subtree twice is harmless.
#[derive(Default)]
pub struct ControlRegistry {
    factories: Mutex<HashMap<String, ControlFactory>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, factory: ControlFactory) {
        self.factories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    fn factory(&self, name: &str) -> Option<ControlFactory> {
        self.factories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl ControlInstantiator for ControlRegistry {
    async fn instantiate(&self, root: Node, token: CancellationToken) -> Result<(), RenderError> {
        for node in root.descendants() {
            if token.is_cancelled() {
                return Err(RenderError::Canceled);
            }
            let Some(name) = node.attribute(CONTROL_ATTR) else {
                continue;
            };
            if node.control().is_some() {
                continue;
            }
            let factory = self
                .factory(&name)
                .ok_or_else(|| RenderError::control(format!("unknown control '{name}'")))?;
            node.set_control(factory(&node)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Rating(Arc<AtomicUsize>);

    impl Control for Rating {
        fn name(&self) -> &str {
            "Rating"
        }
        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn instantiates_once_and_disposes_with_the_node() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let registry = ControlRegistry::new();
        let d = Arc::clone(&disposed);
        registry.register(
            "Rating",
            Arc::new(move |_: &Node| Ok::<Arc<dyn Control>, RenderError>(Arc::new(Rating(Arc::clone(&d))))),
        );

        let root = Node::new("div");
        let host = Node::new("div");
        host.set_attribute(CONTROL_ATTR, "Rating");
        root.append_child(&host);

        registry.instantiate(root.clone(), CancellationToken::new()).await.expect("first pass");
        let first = host.control().expect("control attached");
        registry.instantiate(root.clone(), CancellationToken::new()).await.expect("second pass");
        assert!(Arc::ptr_eq(&first, &host.control().expect("still attached")));
        assert_eq!(first.name(), "Rating");

        root.dispose();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_controls_fail() {
        let root = Node::new("div");
        root.set_attribute(CONTROL_ATTR, "Missing");
        let err = ControlRegistry::new()
            .instantiate(root, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "render_control_failed");
    }
}
