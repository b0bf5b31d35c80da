mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bindery::{Event, EventKind, Pending, Services, Subscribe, Template};
use common::spans;
use serde_json::json;

#[derive(Default)]
struct Journal {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Journal {
    async fn on_event(&self, event: &Event) {
        self.kinds.lock().unwrap().push(event.kind);
    }

    fn name(&self) -> &'static str {
        "journal"
    }
}

#[tokio::test]
async fn subscribers_receive_render_lifecycle() {
    let journal = Arc::new(Journal::default());
    let services = Services::builder()
        .with_subscribers(vec![journal.clone() as Arc<dyn Subscribe>])
        .build();
    let template = Template::new(Some(spans(1)), services);

    template
        .render(Pending::Ready(json!({ "name": "ada" })), None)
        .complete
        .await
        .expect("render");

    tokio::time::timeout(Duration::from_secs(5), async {
        while !journal.kinds.lock().unwrap().contains(&EventKind::RenderCompleted) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("completion delivered");

    let kinds = journal.kinds.lock().unwrap().clone();
    let created = kinds.iter().position(|k| *k == EventKind::TemplateCreated);
    let completed = kinds.iter().position(|k| *k == EventKind::RenderCompleted);
    assert!(created.is_some());
    assert!(created < completed);
}
