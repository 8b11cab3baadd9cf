//! End-to-end agent pipeline checks against a scripted collector transport:
//! connect handshake, recording through the facade, and the final flush on
//! shutdown.

use pulse_agent::collector::{method, CollectorTransport, SubmitOutcome, SubmitRequest};
use pulse_agent::events::log_event::LogData;
use pulse_agent::{AgentConfig, Application, AttributeValue, SegmentKind};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

const LICENSE: &str = "0123456789012345678901234567890123456789";

/// Accepts everything, remembers every request.
struct RecordingTransport {
    log: Mutex<Vec<(String, String, Value)>>, // (host, method, payload)
}

impl RecordingTransport {
    fn new() -> Self {
        RecordingTransport {
            log: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<(String, String, Value)> {
        self.log.lock().unwrap().clone()
    }

    fn payload_for(&self, m: &str) -> Option<Value> {
        self.requests()
            .into_iter()
            .find(|(_, method, _)| method == m)
            .map(|(_, _, p)| p)
    }
}

impl CollectorTransport for RecordingTransport {
    fn submit(&self, host: &str, _license: &str, req: &SubmitRequest<'_>) -> SubmitOutcome {
        self.log
            .lock()
            .unwrap()
            .push((host.to_string(), req.method.to_string(), req.payload.clone()));
        match req.method {
            method::PRECONNECT => {
                SubmitOutcome::Accepted(Some(json!({"redirect_host": "collector.shard7.test"})))
            }
            method::CONNECT => SubmitOutcome::Accepted(Some(json!({
                "agent_run_id": "run-77",
                "entity_guid": "ENTITY-GUID",
                "trusted_account_key": "190",
                "account_id": "332029",
                "primary_application_id": "2827902",
                "sample_everything": true,
            }))),
            _ => SubmitOutcome::Accepted(None),
        }
    }
}

fn app(transport: Arc<RecordingTransport>) -> Application {
    let config = AgentConfig::new("My App", LICENSE);
    Application::with_transport(config, transport).unwrap()
}

#[test]
fn connect_uses_preconnect_redirect() {
    let transport = Arc::new(RecordingTransport::new());
    let app = app(transport.clone());
    assert!(app.wait_for_connection(Duration::from_secs(10)));
    app.shutdown(Duration::from_secs(10));

    let requests = transport.requests();
    let pre = requests.iter().find(|(_, m, _)| m == method::PRECONNECT).unwrap();
    assert_eq!(pre.0, "collector.newrelic.com");
    let conn = requests.iter().find(|(_, m, _)| m == method::CONNECT).unwrap();
    assert_eq!(conn.0, "collector.shard7.test");

    let body = &conn.2[0];
    assert_eq!(body["language"], "rust");
    assert_eq!(body["app_name"], json!(["My App"]));
    assert!(body["pid"].as_u64().unwrap() > 0);
    assert!(body.get("settings").is_some());
}

#[test]
fn shutdown_flushes_recorded_work() {
    let transport = Arc::new(RecordingTransport::new());
    let app = app(transport.clone());
    assert!(app.wait_for_connection(Duration::from_secs(10)));

    let now = SystemTime::now();
    let mut txn = app.start_transaction("checkout");
    txn.set_web_request("/checkout");
    txn.add_attribute("plan", AttributeValue::from("pro"));
    let seg = txn.start_segment(0, now).unwrap();
    txn.end_segment(
        seg,
        now + Duration::from_millis(50),
        SegmentKind::External {
            host: "payments.example.com".into(),
            url: Some("https://payments.example.com/charge".into()),
            procedure: Some("POST".into()),
            library: None,
            status_code: Some(201),
        },
    );
    txn.end(now + Duration::from_millis(80));

    app.record_custom_event(
        "Purchase",
        vec![("amount".into(), AttributeValue::Float(9.99))],
    );
    app.record_custom_metric("carts_active", 3.0);
    app.record_log(LogData {
        timestamp: 0,
        severity: "WARN".into(),
        message: "low stock".into(),
        context: Some(json!({"sku": "A-100"})),
        trace_id: None,
        span_id: None,
    });

    app.shutdown(Duration::from_secs(10));

    // Transaction events: [run_id, header, [events]]
    let txn_events = transport.payload_for(method::TXN_EVENTS).unwrap();
    assert_eq!(txn_events[0], "run-77");
    assert_eq!(txn_events[1]["events_seen"], 1);
    let event = &txn_events[2][0];
    assert_eq!(event[0]["type"], "Transaction");
    assert_eq!(event[0]["name"], "WebTransaction/Rust/checkout");
    assert_eq!(event[0]["externalCallCount"], 1);
    assert_eq!(event[1]["plan"], "pro");

    // Custom events
    let custom = transport.payload_for(method::CUSTOM_EVENTS).unwrap();
    assert_eq!(custom[2][0][0]["type"], "Purchase");
    assert_eq!(custom[2][0][1]["amount"], 9.99);

    // Metrics: rollup and custom metric present
    let metrics = transport.payload_for(method::METRIC_DATA).unwrap();
    let names: Vec<String> = metrics[3]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e[0]["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"WebTransaction".to_string()));
    assert!(names.contains(&"Custom/carts_active".to_string()));
    assert!(names.contains(&"External/all".to_string()));
    assert!(names.contains(&"Logging/lines/WARN".to_string()));

    // Logs: common block plus the record
    let logs = transport.payload_for(method::LOG_EVENTS).unwrap();
    assert_eq!(logs[0]["common"]["attributes"]["entity.guid"], "ENTITY-GUID");
    assert_eq!(logs[0]["logs"][0]["message"], "low stock");
    assert_eq!(logs[0]["logs"][0]["level"], "WARN");
    assert_eq!(logs[0]["logs"][0]["attributes"]["sku"], "A-100");
}

#[test]
fn oversized_log_records_are_rejected() {
    let transport = Arc::new(RecordingTransport::new());
    let app = app(transport.clone());
    assert!(app.wait_for_connection(Duration::from_secs(10)));

    // Exactly at the cap: accepted. One byte over: rejected.
    app.record_log(LogData {
        timestamp: 1,
        severity: "INFO".into(),
        message: "x".repeat(32_768),
        context: None,
        trace_id: None,
        span_id: None,
    });
    app.record_log(LogData {
        timestamp: 2,
        severity: "INFO".into(),
        message: "y".repeat(32_769),
        context: None,
        trace_id: None,
        span_id: None,
    });
    app.shutdown(Duration::from_secs(10));

    let logs = transport.payload_for(method::LOG_EVENTS).unwrap();
    let entries = logs[0]["logs"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0]["message"].as_str().unwrap().starts_with('x'));
}

#[test]
fn span_events_flow_for_sampled_transactions() {
    let transport = Arc::new(RecordingTransport::new());
    let app = app(transport.clone());
    assert!(app.wait_for_connection(Duration::from_secs(10)));

    let now = SystemTime::now();
    let mut txn = app.start_transaction("traced");
    let seg = txn.start_segment(0, now).unwrap();
    txn.end_segment(
        seg,
        now + Duration::from_millis(10),
        SegmentKind::Datastore {
            product: "Postgres".into(),
            collection: "orders".into(),
            operation: "SELECT".into(),
            host: None,
            port_path_or_id: None,
            database_name: None,
            query: None,
        },
    );
    txn.end(now + Duration::from_millis(20));
    app.shutdown(Duration::from_secs(10));

    // sample_everything in the reply forces sampling, so spans flow.
    let spans = transport.payload_for(method::SPAN_EVENTS).unwrap();
    let events = spans[2].as_array().unwrap();
    assert_eq!(events.len(), 2);
    let root = &events
        .iter()
        .find(|e| e[0]["nr.entryPoint"] == true)
        .unwrap()[0];
    let child = &events
        .iter()
        .find(|e| e[0].get("nr.entryPoint").is_none())
        .unwrap()[0];
    assert_eq!(child["category"], "datastore");
    assert_eq!(child["parentId"], root["guid"]);
}
