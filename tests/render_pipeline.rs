mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bindery::template::{LOADING_CLASS, TEMPLATE_CLASS};
use bindery::{
    DataValue, EventKind, FragmentLoader, Node, Pending, RenderError, Services, Template, Work,
};
use common::{Call, Recorder, drain, kinds, recording_services, spans};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

fn ada() -> Pending<DataValue> {
    Pending::Ready(json!({ "name": "ada" }))
}

async fn until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn never_ready() -> Work<DataValue> {
    Work::cancellable(CancellationToken::new(), async {
        futures::future::pending::<()>().await;
        Ok(DataValue::Null)
    })
}

#[tokio::test]
async fn fresh_container_is_processed_as_one_root_unit() {
    let rec = Recorder::new();
    let template = Template::new(Some(spans(2)), recording_services(&rec, None, false));

    let result = template.render(ada(), None);
    let owner = result.subtree.clone().await.expect("subtree");
    let done = result.complete.clone().await.expect("complete");

    assert!(owner.ptr_eq(&done));
    assert_eq!(
        rec.calls(),
        vec![
            Call::Control(owner.id()),
            Call::Bind {
                node: owner.id(),
                root_scope: true
            },
        ]
    );
    assert!(owner.has_class(TEMPLATE_CLASS));
    assert!(!owner.has_class(LOADING_CLASS));
    for child in owner.children() {
        assert!(child.is_scope_boundary());
        assert_eq!(child.text().as_deref(), Some("ada"));
    }
}

#[tokio::test]
async fn one_added_node_is_processed_alone() {
    let rec = Recorder::new();
    let template = Template::new(Some(spans(1)), recording_services(&rec, None, false));
    let container = Node::new("ul");
    let old = Node::new("li");
    container.append_child(&old);

    let result = template.render(ada(), Some(container.clone()));
    let owner = result.complete.clone().await.expect("complete");
    let added = container.child_at(1).expect("added node");

    assert!(owner.ptr_eq(&container));
    assert_eq!(
        rec.calls(),
        vec![
            Call::Control(added.id()),
            Call::Bind {
                node: added.id(),
                root_scope: false
            },
        ]
    );
    assert_eq!(added.text().as_deref(), Some("ada"));
    assert_eq!(old.text(), None);
}

#[tokio::test]
async fn many_added_nodes_finish_controls_before_binding_and_keep_their_snapshot() {
    let rec = Recorder::new();
    let gate = Arc::new(Semaphore::new(0));
    let template = Template::new(
        Some(spans(2)),
        recording_services(&rec, Some(Arc::clone(&gate)), true),
    );
    let container = Node::new("ul");
    let old = Node::new("li");
    container.append_child(&old);

    let result = template.render(ada(), Some(container.clone()));
    let owner = result.subtree.clone().await.expect("subtree");
    assert!(owner.ptr_eq(&container));
    assert!(!result.complete.is_settled());

    let mut added: Vec<_> = container.children()[1..].iter().map(Node::id).collect();
    until(|| rec.controlled().len() == 2).await;
    assert!(rec.bound().is_empty());

    gate.add_permits(8);
    result.complete.clone().await.expect("complete");

    let calls = rec.calls();
    assert!(calls[..2].iter().all(|c| matches!(c, Call::Control(_))));
    assert!(
        calls[2..]
            .iter()
            .all(|c| matches!(c, Call::Bind { root_scope: false, .. }))
    );
    let mut controlled = rec.controlled();
    let mut bound = rec.bound();
    added.sort_unstable();
    controlled.sort_unstable();
    bound.sort_unstable();
    assert_eq!(controlled, added);
    assert_eq!(bound, added);

    assert_eq!(old.text(), None);
    assert!(container.children().iter().all(Node::is_scope_boundary));
}

#[tokio::test]
async fn cancelling_tears_down_once_and_stops_binding() {
    let rec = Recorder::new();
    let template = Template::new(Some(spans(1)), recording_services(&rec, None, false));
    let data = never_ready();

    let result = template.render(Pending::from(data.clone()), None);
    let owner = result.subtree.clone().await.expect("subtree");
    let disposals = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&disposals);
    owner.mark_disposable(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    until(|| rec.controlled().len() == 1).await;

    result.cancel();
    assert_eq!(result.complete.wait().await, Err(RenderError::Canceled));
    result.cancel();
    owner.dispose();

    assert!(owner.is_disposed());
    assert_eq!(disposals.load(Ordering::SeqCst), 1);
    assert!(rec.bound().is_empty());
    assert!(!owner.has_class(LOADING_CLASS));
    assert!(!data.token().is_cancelled());
}

#[tokio::test]
async fn supplied_container_survives_cancellation() {
    let rec = Recorder::new();
    let gate = Arc::new(Semaphore::new(0));
    let template = Template::new(Some(spans(2)), recording_services(&rec, Some(gate), false));
    let container = Node::new("ul");
    let old = Node::new("li");
    container.append_child(&old);

    let result = template.render(ada(), Some(container.clone()));
    result.subtree.clone().await.expect("subtree");
    let added: Vec<Node> = container.children().into_iter().skip(1).collect();

    result.cancel();
    assert_eq!(result.complete.wait().await, Err(RenderError::Canceled));

    assert!(!container.is_disposed());
    assert!(!old.is_disposed());
    assert!(added.iter().all(Node::is_disposed));
    assert!(container.has_class(TEMPLATE_CLASS));
    assert!(!container.has_class(LOADING_CLASS));
}

#[tokio::test]
async fn cancelled_render_leaves_host_bindings_alone() {
    let rec = Recorder::new();
    let gate = Arc::new(Semaphore::new(0));
    let template = Template::new(Some(spans(2)), recording_services(&rec, Some(gate), false));
    let container = Node::new("ul");
    container.append_child(&Node::new("li"));
    let host = CancellationToken::new();
    container.add_binding(host.clone());

    let result = template.render(ada(), Some(container.clone()));
    result.subtree.clone().await.expect("subtree");
    result.cancel();
    assert_eq!(result.complete.wait().await, Err(RenderError::Canceled));

    assert!(!host.is_cancelled());
    assert_eq!(container.binding_count(), 1);
    assert!(!container.is_disposed());
}

#[tokio::test]
async fn repeated_renders_into_one_container_keep_no_hooks() {
    let template = Template::new(Some(spans(1)), Services::default());
    let container = Node::new("ul");

    for name in ["ada", "grace", "edsger"] {
        let data = Pending::Ready(json!({ "name": name }));
        template
            .render(data, Some(container.clone()))
            .complete
            .await
            .expect("render");
    }
    assert_eq!(container.child_count(), 3);
    assert_eq!(container.hook_count(), 0);
}

#[tokio::test]
async fn data_context_failures_are_distinct_from_binding_failures() {
    let rec = Recorder::new();
    let template = Template::new(Some(spans(1)), recording_services(&rec, None, false));

    let failed: Work<DataValue> = Work::failed(RenderError::markup("feed offline"));
    let result = template.render(Pending::from(failed), None);
    let err = result.complete.wait().await.expect_err("data failed");
    assert_eq!(err.as_label(), "render_data_context_failed");
    assert_eq!(rec.controlled().len(), 1);
    assert!(rec.bound().is_empty());
    let owner = result.subtree.wait().await.expect("subtree attached");
    assert!(owner.is_disposed());

    let broken = Node::new("div");
    let span = Node::new("span");
    span.set_attribute("data-bind", "text");
    broken.append_child(&span);
    let template = Template::new(Some(broken), Services::default());
    let mut rx = template.services().bus().subscribe();
    let err = template
        .render_interpreted(ada(), None)
        .complete
        .wait()
        .await
        .expect_err("binding failed");
    assert_eq!(err.as_label(), "render_binding_failed");
    assert!(kinds(&drain(&mut rx)).contains(&EventKind::RenderFailed));
}

#[tokio::test]
async fn extracted_child_becomes_the_owner() {
    let markup = Node::new("div");
    let card = Node::new("section");
    card.set_attribute("data-bind", "title: name");
    let label = Node::new("span");
    label.set_attribute("data-bind", "text: name");
    card.append_child(&label);
    markup.append_child(&card);

    let template = Template::new(Some(markup), Services::default());
    template.set_extract_child(true);
    let container = Node::new("div");

    let result = template.render(ada(), Some(container.clone()));
    let owner = result.subtree.clone().await.expect("subtree");
    result.complete.clone().await.expect("complete");

    assert_eq!(owner.tag(), "section");
    assert!(owner.parent().is_some_and(|p| p.ptr_eq(&container)));
    assert_eq!(owner.property("title"), Some(json!("ada")));
    assert_eq!(
        owner.first_child().and_then(|s| s.text()).as_deref(),
        Some("ada")
    );
}

#[tokio::test]
async fn extracting_from_empty_markup_is_structural() {
    let template = Template::new(None, Services::default());
    template.set_extract_child(true);

    let result = template.render_interpreted(ada(), None);
    assert_eq!(
        result.subtree.wait().await.map_err(|e| e.as_label()),
        Err("render_structural")
    );
    assert_eq!(
        result.complete.wait().await.map_err(|e| e.as_label()),
        Err("render_structural")
    );
}

#[tokio::test]
async fn render_href_loads_registered_fragments() {
    let loader = Arc::new(FragmentLoader::new());
    loader.register("views/card.html", spans(1));
    let services = Services::builder().with_resolver(loader).build();

    let node = Template::render_href(&services, "views/card.html", ada(), None)
        .complete
        .await
        .expect("rendered");
    assert_eq!(node.first_child().and_then(|s| s.text()).as_deref(), Some("ada"));

    let err = Template::render_href(&services, "views/missing.html", ada(), None)
        .complete
        .await
        .expect_err("unknown uri");
    assert_eq!(err.as_label(), "render_markup_unavailable");
}

#[tokio::test]
async fn lifecycle_events_follow_the_pipeline() {
    let template = Template::new(Some(spans(1)), Services::default());
    let mut rx = template.services().bus().subscribe();

    template.render(ada(), None).complete.await.expect("complete");
    let seen = kinds(&drain(&mut rx));

    let order = [
        EventKind::StrategyResolved,
        EventKind::RenderStarting,
        EventKind::SubtreeAttached,
        EventKind::RenderCompleted,
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|k| seen.iter().position(|s| s == k).expect("event published"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(start_paused = true)]
async fn process_timeout_delays_processing() {
    let template = Template::new(Some(spans(1)), Services::default());
    template.set_process_timeout_ms(40);
    let mut rx = template.services().bus().subscribe();

    let start = tokio::time::Instant::now();
    template.render(ada(), None).complete.await.expect("complete");
    assert!(start.elapsed() >= Duration::from_millis(40));

    let events = drain(&mut rx);
    let starting = events
        .iter()
        .find(|e| e.kind == EventKind::RenderStarting)
        .expect("starting event");
    assert_eq!(starting.delay_ms, Some(40));

    template.set_process_timeout_ms(-1);
    template.render(ada(), None).complete.await.expect("yielding render completes");
}

#[tokio::test]
async fn debug_break_fires_on_the_first_render_only() {
    let template = Template::new(Some(spans(1)), Services::default());
    template.set_debug_break_on_render(true);
    let mut rx = template.services().bus().subscribe();

    template.render(ada(), None).complete.await.expect("first");
    template.render(ada(), None).complete.await.expect("second");

    let breaks = kinds(&drain(&mut rx))
        .into_iter()
        .filter(|k| *k == EventKind::DebugBreak)
        .count();
    assert_eq!(breaks, 1);
    assert_eq!(template.render_count(), 2);
}
