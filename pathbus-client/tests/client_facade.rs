use async_trait::async_trait;
use pathbus_client::Client;
use pathbus_core::{ClientHandler, EngineResult, Event, Trace, TraceStatus};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct SpyTransport {
    published: Mutex<Vec<(String, Duration)>>,
    saved: Mutex<Vec<(Uuid, String, Duration)>>,
    traces: Mutex<Vec<Trace>>,
}

#[async_trait]
impl ClientHandler for SpyTransport {
    async fn publish(&self, raw: &str, delay: Duration) -> EngineResult<()> {
        self.published.lock().unwrap().push((raw.to_string(), delay));
        Ok(())
    }

    async fn save(&self, id: Uuid, raw: &str, delay: Duration) -> EngineResult<()> {
        self.saved.lock().unwrap().push((id, raw.to_string(), delay));
        Ok(())
    }

    async fn trace(&self, trace: Trace) {
        self.traces.lock().unwrap().push(trace);
    }

    async fn log(&self, _line: String) {}

    async fn fail(&self, _id: Uuid, _raw: &str, _error: String, _stack: String) {}
}

#[tokio::test]
async fn emit_publishes_immediately_with_emit_trace() {
    let transport = Arc::new(SpyTransport::default());
    let client = Client::new("billing", transport.clone());

    client.emit("invoice.created", &json!({"amount": 12})).await.unwrap();

    let published = transport.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1, Duration::ZERO);

    // 线格式与引擎一致：根事件，transaction_id 即 id
    let evt: Event = serde_json::from_str(&published[0].0).unwrap();
    assert_eq!(evt.path, "invoice.created");
    assert_eq!(evt.transaction_id, evt.id);
    assert_eq!(evt.parent_id, None);
    assert_eq!(evt.body, json!({"amount": 12}));

    let traces = transport.traces.lock().unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].status, TraceStatus::Emit);
    assert_eq!(traces[0].event.id, evt.id);
}

#[tokio::test]
async fn short_defer_queues_and_long_defer_persists() {
    let transport = Arc::new(SpyTransport::default());
    let client = Client::new("billing", transport.clone());

    client
        .emit_defer("invoice.remind", &json!({}), Duration::from_secs(30))
        .await
        .unwrap();
    client
        .emit_defer("invoice.expire", &json!({}), Duration::from_secs(90))
        .await
        .unwrap();

    let published = transport.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1, Duration::from_secs(30));

    let saved = transport.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].2, Duration::from_secs(90));
    let stored: Event = serde_json::from_str(&saved[0].1).unwrap();
    assert_eq!(stored.id, saved[0].0);
    assert_eq!(stored.delay, Duration::from_secs(90));

    assert_eq!(transport.traces.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn client_keeps_its_diagnostic_name() {
    let transport = Arc::new(SpyTransport::default());
    let client = Client::new("billing", transport);
    assert_eq!(client.name(), "billing");
}
