//! Render outputs and item inputs.

use serde::{Deserialize, Serialize};

use crate::collab::DataValue;
use crate::dom::Node;
use crate::error::RenderError;
use crate::task::Work;

/// Handles returned by every render call.
///
/// `subtree` settles once markup is attached; `complete` settles after every
/// control and binding was processed, and never before `subtree`.
#[derive(Clone, Debug)]
pub struct RenderResult {
    /// Resolves to the owner node (the extracted child when extraction is on).
    pub subtree: Work<Node>,
    /// Resolves to the same node once processing finished; may reject.
    pub complete: Work<Node>,
}

impl RenderResult {
    /// Both handles rejected with `error`.
    pub fn failed(error: RenderError) -> Self {
        Self {
            subtree: Work::failed(error.clone()),
            complete: Work::failed(error),
        }
    }

    /// Cancels the render. Idempotent.
    ///
    /// Rendered results share one token between both handles; a
    /// [`RenderResult::failed`] pair does not, so both are cancelled.
    pub fn cancel(&self) {
        self.subtree.cancel();
        self.complete.cancel();
    }
}

/// One list item handed to `Template::render_item`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub key: Option<String>,
    pub data: DataValue,
}

impl Item {
    pub fn new(data: DataValue) -> Self {
        Self { key: None, data }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_reaches_both_handles() {
        let result = RenderResult::failed(RenderError::structural("no markup"));
        result.cancel();
        assert!(result.subtree.token().is_cancelled());
        assert!(result.complete.token().is_cancelled());
    }
}
