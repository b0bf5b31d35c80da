//! # Capability set shared by templates.
//!
//! [`Services`] composes every collaborator a template needs: fragment
//! resolution, binding, control instantiation, scheduling, compilation and the
//! event bus. It is cheap to clone and is shared by any number of templates.
//!
//! ```text
//! ServicesBuilder::new()
//!     .with_resolver(..)      default: FragmentLoader
//!     .with_binder(..)        default: DeclarativeBinder
//!     .with_controls(..)      default: ControlRegistry
//!     .with_scheduler(..)     default: TokioScheduler
//!     .with_compiler(..)      default: SnapshotCompiler
//!     .with_subscribers(..)   optional: spawns Bus ─► SubscriberSet listener
//!     .build()
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use crate::collab::{
    BindingProcessor, ControlInstantiator, ControlRegistry, DeclarativeBinder, FragmentLoader,
    FragmentResolver, SnapshotCompiler, TemplateCompiler,
};
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::task::{Scheduler, TokioScheduler};

/// Collaborators used by templates and work queues.
#[derive(Clone)]
pub struct Services {
    resolver: Arc<dyn FragmentResolver>,
    binder: Arc<dyn BindingProcessor>,
    controls: Arc<dyn ControlInstantiator>,
    scheduler: Arc<dyn Scheduler>,
    compiler: Arc<dyn TemplateCompiler>,
    bus: Bus,
}

impl Services {
    /// Starts a builder with every built-in collaborator.
    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::new()
    }

    pub fn resolver(&self) -> &Arc<dyn FragmentResolver> {
        &self.resolver
    }

    pub fn binder(&self) -> &Arc<dyn BindingProcessor> {
        &self.binder
    }

    pub fn controls(&self) -> &Arc<dyn ControlInstantiator> {
        &self.controls
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn compiler(&self) -> &Arc<dyn TemplateCompiler> {
        &self.compiler
    }

    /// Bus every template and queue built from these services publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }
}

impl Default for Services {
    fn default() -> Self {
        ServicesBuilder::new().build()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Builder for [`Services`].
pub struct ServicesBuilder {
    resolver: Option<Arc<dyn FragmentResolver>>,
    binder: Option<Arc<dyn BindingProcessor>>,
    controls: Option<Arc<dyn ControlInstantiator>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    compiler: Option<Arc<dyn TemplateCompiler>>,
    bus_capacity: usize,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ServicesBuilder {
    pub fn new() -> Self {
        Self {
            resolver: None,
            binder: None,
            controls: None,
            scheduler: None,
            compiler: None,
            bus_capacity: 1024,
            subscribers: Vec::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn FragmentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_binder(mut self, binder: Arc<dyn BindingProcessor>) -> Self {
        self.binder = Some(binder);
        self
    }

    pub fn with_controls(mut self, controls: Arc<dyn ControlInstantiator>) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn TemplateCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Event bus ring buffer size (min 1).
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Sets event subscribers.
    ///
    /// When non-empty, [`build`](Self::build) spawns the listener task and
    /// therefore must run inside a tokio runtime.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the services, filling unset collaborators with built-ins.
    pub fn build(self) -> Services {
        let bus = Bus::new(self.bus_capacity);
        if !self.subscribers.is_empty() {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            subscriber_listener(&bus, set);
        }
        Services {
            resolver: self.resolver.unwrap_or_else(|| Arc::new(FragmentLoader::new())),
            binder: self.binder.unwrap_or_else(|| Arc::new(DeclarativeBinder::new())),
            controls: self.controls.unwrap_or_else(|| Arc::new(ControlRegistry::new())),
            scheduler: self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler)),
            compiler: self.compiler.unwrap_or_else(|| Arc::new(SnapshotCompiler)),
            bus,
        }
    }
}

impl Default for ServicesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
fn subscriber_listener(bus: &Bus, set: SubscriberSet) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "subscriber listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        set.shutdown().await;
    });
}
