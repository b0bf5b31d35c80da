//! Collaborator doubles shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bindery::collab::{
    BindRequest, BindingProcessor, CompileRequest, CompiledTemplate, ControlInstantiator,
    DeclarativeBinder, SnapshotCompiler, TemplateCompiler,
};
use bindery::{DataValue, Event, EventKind, Node, NodeId, RenderError, Services};
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

/// One collaborator invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Control(NodeId),
    Bind { node: NodeId, root_scope: bool },
}

/// Ordered call log shared by the doubles.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn controlled(&self) -> Vec<NodeId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Control(id) => Some(id),
                Call::Bind { .. } => None,
            })
            .collect()
    }

    pub fn bound(&self) -> Vec<NodeId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Bind { node, .. } => Some(node),
                Call::Control(_) => None,
            })
            .collect()
    }
}

/// Records each unit node; optionally holds until the gate opens.
pub struct RecordingControls {
    pub recorder: Arc<Recorder>,
    pub gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl ControlInstantiator for RecordingControls {
    async fn instantiate(&self, root: Node, token: CancellationToken) -> Result<(), RenderError> {
        self.recorder.push(Call::Control(root.id()));
        if let Some(gate) = &self.gate {
            tokio::select! {
                _ = token.cancelled() => return Err(RenderError::Canceled),
                permit = gate.acquire() => drop(permit),
            }
        }
        Ok(())
    }
}

/// Records each unit node, then delegates to the declarative binder.
///
/// With `rotate` set, binding a node first moves it behind its last sibling.
pub struct RecordingBinder {
    pub recorder: Arc<Recorder>,
    pub rotate: bool,
}

#[async_trait]
impl BindingProcessor for RecordingBinder {
    async fn apply(
        &self,
        root: Node,
        request: BindRequest,
        token: CancellationToken,
    ) -> Result<DataValue, RenderError> {
        self.recorder.push(Call::Bind {
            node: root.id(),
            root_scope: request.root_scope,
        });
        if self.rotate {
            if let Some(parent) = root.parent() {
                parent.append_child(&root);
            }
        }
        DeclarativeBinder::new().apply(root, request, token).await
    }
}

/// Counts compilations, delegating to [`SnapshotCompiler`] unless told to fail.
#[derive(Default)]
pub struct CountingCompiler {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl TemplateCompiler for CountingCompiler {
    fn compile(&self, request: CompileRequest) -> Result<Arc<dyn CompiledTemplate>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RenderError::binding("compiler rejected the markup"));
        }
        SnapshotCompiler.compile(request)
    }
}

impl CountingCompiler {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Services whose controls and binder record into `recorder`.
pub fn recording_services(recorder: &Arc<Recorder>, gate: Option<Arc<Semaphore>>, rotate: bool) -> Services {
    Services::builder()
        .with_controls(Arc::new(RecordingControls {
            recorder: Arc::clone(recorder),
            gate,
        }))
        .with_binder(Arc::new(RecordingBinder {
            recorder: Arc::clone(recorder),
            rotate,
        }))
        .build()
}

/// `<div><span data-bind="text: name"/>..</div>` with `n` spans.
pub fn spans(n: usize) -> Node {
    let root = Node::new("div");
    for _ in 0..n {
        let span = Node::new("span");
        span.set_attribute("data-bind", "text: name");
        root.append_child(&span);
    }
    root
}

/// Drains every event already published on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

pub fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

/// Waits until `n` events of `kind` have been received.
pub async fn wait_for(rx: &mut broadcast::Receiver<Event>, kind: EventKind, n: usize) -> Vec<Event> {
    let mut seen = Vec::new();
    let collect = async {
        let mut count = 0;
        while count < n {
            let ev = rx.recv().await.expect("bus open");
            if ev.kind == kind {
                count += 1;
            }
            seen.push(ev);
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("events arrive in time");
    seen
}
