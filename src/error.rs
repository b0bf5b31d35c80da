//! Error types used by the rendering engine and the work queue.
//!
//! All failures are reported through one enum, [`RenderError`]. It is `Clone`
//! because a render outcome is computed once and observed by every holder of
//! the handle (see [`Work`](crate::task::Work)).
//!
//! [`RenderError::Canceled`] is not a real failure: it is the distinguished
//! rejection carried by cancelled work and is reported as `RenderCanceled`
//! rather than `RenderFailed` on the event bus.

use thiserror::Error;

/// # Errors produced while rendering templates or running queued work.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The produced markup did not have the expected shape
    /// (for example, nothing to extract when `extract_child` is set).
    #[error("structural error: {reason}")]
    Structural {
        /// What was wrong with the structure.
        reason: String,
    },

    /// The compiled strategy could not be constructed. Fatal for the render
    /// call that triggered compilation; never silently retried.
    #[error("compiled strategy construction failed: {error}")]
    StrategyConstruction {
        /// The underlying compiler message.
        error: String,
    },

    /// The work was cancelled.
    #[error("render canceled")]
    Canceled,

    /// Declarative binding application failed.
    #[error("binding application failed: {error}")]
    Binding {
        /// The underlying binder message.
        error: String,
    },

    /// Nested control instantiation failed.
    #[error("control instantiation failed: {error}")]
    Control {
        /// The underlying instantiator message.
        error: String,
    },

    /// Markup could not be loaded or cloned into the container.
    #[error("markup unavailable: {error}")]
    Markup {
        /// The underlying resolver message.
        error: String,
    },

    /// The data context handed to the render failed on its own.
    #[error("data context failed: {error}")]
    DataContext {
        /// The failure reported by the data context.
        error: String,
    },

    /// A work closure or spawned stage panicked.
    #[error("work panicked: {error}")]
    Panicked {
        /// Panic payload, when it was a string.
        error: String,
    },
}

impl RenderError {
    /// Shorthand for [`RenderError::Structural`].
    pub fn structural(reason: impl Into<String>) -> Self {
        RenderError::Structural {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`RenderError::Binding`].
    pub fn binding(error: impl Into<String>) -> Self {
        RenderError::Binding {
            error: error.into(),
        }
    }

    /// Shorthand for [`RenderError::Control`].
    pub fn control(error: impl Into<String>) -> Self {
        RenderError::Control {
            error: error.into(),
        }
    }

    /// Shorthand for [`RenderError::Markup`].
    pub fn markup(error: impl Into<String>) -> Self {
        RenderError::Markup {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use bindery::RenderError;
    ///
    /// assert_eq!(RenderError::Canceled.as_label(), "render_canceled");
    /// assert_eq!(RenderError::binding("x").as_label(), "render_binding_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RenderError::Structural { .. } => "render_structural",
            RenderError::StrategyConstruction { .. } => "render_strategy_construction",
            RenderError::Canceled => "render_canceled",
            RenderError::Binding { .. } => "render_binding_failed",
            RenderError::Control { .. } => "render_control_failed",
            RenderError::Markup { .. } => "render_markup_unavailable",
            RenderError::DataContext { .. } => "render_data_context_failed",
            RenderError::Panicked { .. } => "render_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RenderError::Structural { reason } => format!("structural: {reason}"),
            RenderError::StrategyConstruction { error } => format!("compile: {error}"),
            RenderError::Canceled => "canceled".to_string(),
            RenderError::Binding { error } => format!("binding: {error}"),
            RenderError::Control { error } => format!("control: {error}"),
            RenderError::Markup { error } => format!("markup: {error}"),
            RenderError::DataContext { error } => format!("data context: {error}"),
            RenderError::Panicked { error } => format!("panic: {error}"),
        }
    }

    /// True for the cancellation signal.
    #[inline]
    pub fn is_canceled(&self) -> bool {
        matches!(self, RenderError::Canceled)
    }

    /// Wraps a failure coming out of a data context, keeping cancellation distinct.
    pub(crate) fn from_data_context(err: RenderError) -> Self {
        match err {
            RenderError::Canceled => RenderError::Canceled,
            RenderError::DataContext { error } => RenderError::DataContext { error },
            other => RenderError::DataContext {
                error: other.as_message(),
            },
        }
    }

    /// Wraps a compiler failure as [`RenderError::StrategyConstruction`].
    pub(crate) fn into_strategy_construction(self) -> Self {
        match self {
            RenderError::StrategyConstruction { error } => RenderError::StrategyConstruction { error },
            other => RenderError::StrategyConstruction {
                error: other.as_message(),
            },
        }
    }

    /// Converts a caught panic payload into [`RenderError::Panicked`].
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let error = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        RenderError::Panicked { error }
    }
}
