//! # Collaborator seams.
//!
//! The engine drives four capabilities it does not implement itself. Each is a
//! narrow trait so hosts can plug their own, and each ships with a small
//! reference implementation:
//!
//! | Trait                   | Built-in             | Used for                          |
//! |-------------------------|----------------------|-----------------------------------|
//! | [`FragmentResolver`]    | [`FragmentLoader`]   | cloning markup into a container   |
//! | [`BindingProcessor`]    | [`DeclarativeBinder`]| `data-bind` attributes            |
//! | [`ControlInstantiator`] | [`ControlRegistry`]  | `data-control` attributes         |
//! | [`TemplateCompiler`]    | [`SnapshotCompiler`] | the compiled render strategy      |
//!
//! Every async call receives the [`CancellationToken`](tokio_util::sync::CancellationToken)
//! of the stage it runs in and should return [`RenderError::Canceled`](crate::RenderError::Canceled)
//! once it observes cancellation.

mod binder;
mod compiler;
mod controls;
mod fragments;

pub use binder::{
    BindRequest, BindingContext, BindingExpr, BindingExpressions, BindingHandle,
    BindingInitializer, BindingProcessor, DeclarativeBinder, BIND_ATTR, one_way,
};
pub use compiler::{
    CompileRequest, CompiledTemplate, SnapshotCompiler, SnapshotTemplate, TemplateCompiler,
};
pub use controls::{CONTROL_ATTR, Control, ControlFactory, ControlInstantiator, ControlRegistry};
pub use fragments::{FragmentLoader, FragmentResolver, MarkupRef};

/// Data handed to bindings.
pub type DataValue = serde_json::Value;
