//! # Declarative binding.
//!
//! [`DeclarativeBinder`] walks a subtree, reads each node's `data-bind`
//! attribute and connects the named targets to paths in the data value:
//!
//! ```text
//! <span data-bind="text: name; title: info.title">
//!        └─ target ─┘ └path┘   └target┘ └─ path ─┘
//! ```
//!
//! Parsed attributes are memoized per template in the
//! [`BindingCache`](crate::template::BindingCache), keyed by the attribute
//! source text.
//!
//! ## Rules
//! - With `root_scope` set, the root is the host container and its own
//!   attribute is skipped; only descendants are bound.
//! - Each established binding is registered on its node and, when recycling
//!   is enabled, its teardown is tracked against the work-unit root.
//! - An initializer that reports [`BindingHandle::Detached`] makes the root
//!   unsafe to recycle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::DataValue;
use crate::dom::Node;
use crate::error::RenderError;
use crate::template::BindingCache;

/// Attribute read by [`DeclarativeBinder`].
pub const BIND_ATTR: &str = "data-bind";

/// Input of one binding pass.
#[derive(Clone)]
pub struct BindRequest {
    /// Value bindings read from.
    pub data: DataValue,
    /// True when the root is the host container rather than template output.
    pub root_scope: bool,
    /// Per-template expression and recycling cache.
    pub cache: Arc<BindingCache>,
    /// Initializer used for every binding; [`one_way`] when absent.
    pub initializer: Option<BindingInitializer>,
}

/// Applies declarative bindings to a subtree.
#[async_trait]
pub trait BindingProcessor: Send + Sync + 'static {
    /// Binds `root` (and its subtree) to `request.data`; resolves to the data value.
    async fn apply(
        &self,
        root: Node,
        request: BindRequest,
        token: CancellationToken,
    ) -> Result<DataValue, RenderError>;
}

/// One `target: path` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingExpr {
    /// Node target: `text` or a property name.
    pub target: String,
    /// Path segments into the data value; empty (`this`) means the whole value.
    pub path: Vec<String>,
}

/// Parsed content of one `data-bind` attribute.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingExpressions {
    pub items: Vec<BindingExpr>,
}

impl BindingExpressions {
    /// Parses `target: path; target: path`.
    pub fn parse(source: &str) -> Result<Self, RenderError> {
        let mut items = Vec::new();
        for part in source.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (target, path) = part
                .split_once(':')
                .ok_or_else(|| RenderError::binding(format!("malformed binding '{part}'")))?;
            let target = target.trim();
            let path = path.trim();
            if target.is_empty() || path.is_empty() {
                return Err(RenderError::binding(format!("malformed binding '{part}'")));
            }
            let path = if path == "this" {
                Vec::new()
            } else {
                path.split('.').map(|s| s.trim().to_string()).collect::<Vec<_>>()
            };
            if path.iter().any(String::is_empty) {
                return Err(RenderError::binding(format!("malformed path in '{part}'")));
            }
            items.push(BindingExpr {
                target: target.to_string(),
                path,
            });
        }
        Ok(Self { items })
    }
}

/// What an initializer is connecting.
pub struct BindingContext<'a> {
    pub node: &'a Node,
    pub target: &'a str,
    /// Value at the expression's path, if the path exists.
    pub value: Option<&'a DataValue>,
}

/// Outcome of one binding initializer.
#[derive(Clone, Debug)]
pub enum BindingHandle {
    /// A live binding that stops when the token is cancelled.
    Cancelable(CancellationToken),
    /// A binding with no teardown.
    Detached,
}

/// Initializer invoked for each binding expression.
pub type BindingInitializer =
    Arc<dyn Fn(&BindingContext<'_>) -> Result<BindingHandle, RenderError> + Send + Sync>;

/// Default initializer: copies the value once into the node.
///
/// `text` writes the node text (strings verbatim, other values as JSON);
/// any other target becomes a property. A missing path writes `null`.
pub fn one_way(ctx: &BindingContext<'_>) -> Result<BindingHandle, RenderError> {
    let value = ctx.value.cloned().unwrap_or(DataValue::Null);
    if ctx.target == "text" {
        let text = match value {
            DataValue::String(s) => s,
            DataValue::Null => String::new(),
            other => other.to_string(),
        };
        ctx.node.set_text(text);
    } else {
        ctx.node.set_property(ctx.target, value);
    }
    Ok(BindingHandle::Cancelable(CancellationToken::new()))
}

fn lookup<'a>(data: &'a DataValue, path: &[String]) -> Option<&'a DataValue> {
    path.iter().try_fold(data, |cur, seg| match cur {
        DataValue::Object(map) => map.get(seg),
        DataValue::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Reference [`BindingProcessor`] for `data-bind` attributes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeclarativeBinder;

impl DeclarativeBinder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BindingProcessor for DeclarativeBinder {
    async fn apply(
        &self,
        root: Node,
        request: BindRequest,
        token: CancellationToken,
    ) -> Result<DataValue, RenderError> {
        let BindRequest {
            data,
            root_scope,
            cache,
            initializer,
        } = request;
        let skip = usize::from(root_scope);

        for node in root.descendants().into_iter().skip(skip) {
            if token.is_cancelled() {
                return Err(RenderError::Canceled);
            }
            let Some(source) = node.attribute(BIND_ATTR) else {
                continue;
            };
            let exprs = cache.expressions_for(&source, BindingExpressions::parse)?;
            for expr in &exprs.items {
                let ctx = BindingContext {
                    node: &node,
                    target: &expr.target,
                    value: lookup(&data, &expr.path),
                };
                let handle = match &initializer {
                    Some(init) => init(&ctx)?,
                    None => one_way(&ctx)?,
                };
                match handle {
                    BindingHandle::Cancelable(binding) => {
                        node.add_binding(binding.clone());
                        cache.track(&root, Box::new(move || binding.cancel()));
                    }
                    BindingHandle::Detached => cache.mark_unsafe(&root),
                }
            }
            tokio::task::yield_now().await;
        }
        Ok(data)
    }
}
