//! Markup sources and the fragment resolver seam.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::dom::Node;
use crate::error::RenderError;

/// Where a template's markup comes from.
#[derive(Clone, Debug)]
pub enum MarkupRef {
    /// An in-memory element; its children are the markup.
    Element(Node),
    /// A locator that must be loaded before it can be cloned.
    Uri(String),
}

impl MarkupRef {
    /// True for in-memory markup.
    pub fn is_element(&self) -> bool {
        matches!(self, MarkupRef::Element(_))
    }
}

/// Loads or clones markup into a target container.
#[async_trait]
pub trait FragmentResolver: Send + Sync + 'static {
    /// Appends a copy of `source`'s content to `target` and returns `target`.
    async fn render_copy(
        &self,
        source: &MarkupRef,
        target: Node,
        token: CancellationToken,
    ) -> Result<Node, RenderError>;
}

/// Reference resolver: clones in-memory markup, serves URIs from a registry
/// of preloaded fragments.
#[derive(Default)]
pub struct FragmentLoader {
    registry: Mutex<HashMap<String, Node>>,
}

impl FragmentLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `fragment` available under `uri`, replacing any previous entry.
    pub fn register(&self, uri: impl Into<String>, fragment: Node) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.into(), fragment);
    }

    /// True if `uri` has a registered fragment.
    pub fn contains(&self, uri: &str) -> bool {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(uri)
    }

    fn lookup(&self, uri: &str) -> Option<Node> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }
}

#[async_trait]
impl FragmentResolver for FragmentLoader {
    async fn render_copy(
        &self,
        source: &MarkupRef,
        target: Node,
        token: CancellationToken,
    ) -> Result<Node, RenderError> {
        if token.is_cancelled() {
            return Err(RenderError::Canceled);
        }
        let fragment = match source {
            MarkupRef::Element(node) => node.clone(),
            MarkupRef::Uri(uri) => self
                .lookup(uri)
                .ok_or_else(|| RenderError::markup(format!("no fragment registered for '{uri}'")))?,
        };
        for child in fragment.children() {
            target.append_child(&child.deep_clone());
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_children_and_leaves_source_intact() {
        let source = Node::new("div");
        source.append_child(&Node::text_node("p", "a"));
        source.append_child(&Node::text_node("p", "b"));

        let target = Node::new("section");
        let out = FragmentLoader::new()
            .render_copy(&MarkupRef::Element(source.clone()), target.clone(), CancellationToken::new())
            .await
            .expect("copy");
        assert_eq!(out, target);
        assert_eq!(target.child_count(), 2);
        assert_eq!(source.child_count(), 2);
        assert_ne!(target.first_child(), source.first_child());
    }

    #[tokio::test]
    async fn unknown_uri_is_a_markup_error() {
        let err = FragmentLoader::new()
            .render_copy(&MarkupRef::Uri("/missing.html".into()), Node::new("div"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "render_markup_unavailable");
    }

    #[tokio::test]
    async fn registered_uri_is_served() {
        let loader = FragmentLoader::new();
        let frag = Node::new("div");
        frag.append_child(&Node::new("li"));
        loader.register("/item.html", frag);
        assert!(loader.contains("/item.html"));

        let target = Node::new("ul");
        loader
            .render_copy(&MarkupRef::Uri("/item.html".into()), target.clone(), CancellationToken::new())
            .await
            .expect("copy");
        assert_eq!(target.child_count(), 1);
    }
}
