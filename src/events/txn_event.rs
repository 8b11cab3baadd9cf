//! Transaction events
//!
//! One event per finished transaction, wire form
//! `[intrinsics, user attributes, agent attributes]`. The intrinsics block
//! carries timing, apdex zone, distributed trace identity, inbound caller
//! fields and synthetics ids; user and agent attributes are pre-filtered to
//! the TxnEvent destination when the transaction closes.

use crate::dt::InboundCaller;
use crate::metrics::ApdexZone;
use crate::priority::Priority;
use crate::reservoir::Prioritized;
use crate::serialize::{duration_to_seconds, to_epoch_millis};
use crate::synthetics::Synthetics;
use serde_json::{json, Map, Value};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct TxnEvent {
    pub final_name: String,
    pub start: SystemTime,
    pub duration: Duration,
    pub total_time: Duration,
    pub is_web: bool,
    pub apdex_zone: ApdexZone,
    pub has_error: bool,
    pub priority: Priority,
    pub sampled: bool,
    /// Set iff distributed tracing was enabled for the owning application.
    pub guid: Option<String>,
    pub trace_id: Option<String>,
    pub inbound: Option<InboundCaller>,
    pub synthetics: Option<Synthetics>,
    pub external_call_count: u64,
    pub external_duration: Duration,
    pub datastore_call_count: u64,
    pub datastore_duration: Duration,
    pub user_attrs: Value,
    pub agent_attrs: Value,
}

impl Prioritized for TxnEvent {
    fn priority(&self) -> Priority {
        self.priority
    }
}

impl TxnEvent {
    pub fn wire(&self) -> Value {
        let mut i = Map::new();
        i.insert("type".into(), "Transaction".into());
        i.insert("name".into(), self.final_name.clone().into());
        i.insert("timestamp".into(), to_epoch_millis(self.start).into());
        i.insert(
            "duration".into(),
            json!(duration_to_seconds(self.duration)),
        );
        i.insert(
            "totalTime".into(),
            json!(duration_to_seconds(self.total_time)),
        );
        if self.has_error {
            i.insert("error".into(), true.into());
        }
        if self.apdex_zone != ApdexZone::None {
            i.insert(
                "nr.apdexPerfZone".into(),
                self.apdex_zone.label().into(),
            );
        }
        if let Some(guid) = &self.guid {
            i.insert("guid".into(), guid.clone().into());
            i.insert("priority".into(), json!(self.priority.value()));
            i.insert("sampled".into(), self.sampled.into());
        }
        if let Some(trace_id) = &self.trace_id {
            i.insert("traceId".into(), trace_id.clone().into());
        }
        if let Some(p) = &self.inbound {
            i.insert("parent.type".into(), p.caller_type.clone().into());
            i.insert("parent.account".into(), p.account.clone().into());
            i.insert("parent.app".into(), p.app.clone().into());
            i.insert(
                "parent.transportType".into(),
                p.transport_type.clone().into(),
            );
            if let Some(td) = p.transport_duration {
                i.insert(
                    "parent.transportDuration".into(),
                    json!(duration_to_seconds(td)),
                );
            }
            if let Some(txn_id) = &p.parent_txn_id {
                i.insert("parentId".into(), txn_id.clone().into());
            }
            if let Some(span_id) = &p.parent_span_id {
                i.insert("parentSpanId".into(), span_id.clone().into());
            }
        }
        if let Some(s) = &self.synthetics {
            i.insert(
                "nr.syntheticsResourceId".into(),
                s.resource_id.clone().into(),
            );
            i.insert("nr.syntheticsJobId".into(), s.job_id.clone().into());
            i.insert("nr.syntheticsMonitorId".into(), s.monitor_id.clone().into());
        }
        if self.external_call_count > 0 {
            i.insert("externalCallCount".into(), self.external_call_count.into());
            i.insert(
                "externalDuration".into(),
                json!(duration_to_seconds(self.external_duration)),
            );
        }
        if self.datastore_call_count > 0 {
            i.insert("databaseCallCount".into(), self.datastore_call_count.into());
            i.insert(
                "databaseDuration".into(),
                json!(duration_to_seconds(self.datastore_duration)),
            );
        }
        json!([Value::Object(i), self.user_attrs, self.agent_attrs])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> TxnEvent {
        TxnEvent {
            final_name: "WebTransaction/Rust/hello".into(),
            start: SystemTime::UNIX_EPOCH + Duration::from_secs(10),
            duration: Duration::from_millis(1500),
            total_time: Duration::from_millis(2000),
            is_web: true,
            apdex_zone: ApdexZone::Tolerating,
            has_error: false,
            priority: Priority::from_value(0.5),
            sampled: false,
            guid: None,
            trace_id: None,
            inbound: None,
            synthetics: None,
            external_call_count: 0,
            external_duration: Duration::ZERO,
            datastore_call_count: 0,
            datastore_duration: Duration::ZERO,
            user_attrs: json!({}),
            agent_attrs: json!({}),
        }
    }

    #[test]
    fn test_wire_shape() {
        let w = event().wire();
        let arr = w.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[0]["type"], "Transaction");
        assert_eq!(arr[0]["name"], "WebTransaction/Rust/hello");
        assert_eq!(arr[0]["timestamp"], 10_000);
        assert_eq!(arr[0]["duration"], 1.5);
        assert_eq!(arr[0]["totalTime"], 2.0);
        assert_eq!(arr[0]["nr.apdexPerfZone"], "T");
        assert!(arr[0].get("guid").is_none());
        assert!(arr[0].get("error").is_none());
    }

    #[test]
    fn test_wire_dt_and_synthetics() {
        let mut e = event();
        e.guid = Some("abcdef0123456789".into());
        e.trace_id = Some("12345678901234567890123456789012".into());
        e.sampled = true;
        e.priority = Priority::from_value(1.5);
        e.synthetics = Some(Synthetics {
            resource_id: "rrrrrrr".into(),
            job_id: "jjjjjjj".into(),
            monitor_id: "mmmmmmm".into(),
            header: "raw".into(),
        });
        let w = e.wire();
        assert_eq!(w[0]["guid"], "abcdef0123456789");
        assert_eq!(w[0]["sampled"], true);
        assert_eq!(w[0]["nr.syntheticsResourceId"], "rrrrrrr");
        assert_eq!(w[0]["nr.syntheticsJobId"], "jjjjjjj");
        assert_eq!(w[0]["nr.syntheticsMonitorId"], "mmmmmmm");
    }

    #[test]
    fn test_wire_inbound_caller() {
        let mut e = event();
        e.inbound = Some(InboundCaller {
            caller_type: "App".into(),
            account: "123".into(),
            app: "456".into(),
            transport_type: "HTTP".into(),
            transport_duration: Some(Duration::from_millis(100)),
            parent_txn_id: Some("tttttttt".into()),
            parent_span_id: Some("ssssssss".into()),
        });
        let w = e.wire();
        assert_eq!(w[0]["parent.type"], "App");
        assert_eq!(w[0]["parent.account"], "123");
        assert_eq!(w[0]["parent.transportDuration"], 0.1);
        assert_eq!(w[0]["parentId"], "tttttttt");
        assert_eq!(w[0]["parentSpanId"], "ssssssss");
    }
}
