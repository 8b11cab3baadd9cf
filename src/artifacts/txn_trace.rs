//! Transaction trace witness
//!
//! At most one trace survives per harvest: the slowest eligible transaction
//! (witness pattern). The trace body is the nested segment tree captured by
//! the tracer, with offsets relative to the transaction start.

use crate::serialize::{duration_to_millis, to_epoch_millis};
use serde_json::{json, Value};
use std::time::{Duration, SystemTime};

/// One node of the captured segment tree.
#[derive(Debug, Clone)]
pub struct TraceNode {
    pub start_offset: Duration,
    pub stop_offset: Duration,
    pub name: String,
    pub attrs: Value,
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    fn wire(&self) -> Value {
        let children: Vec<Value> = self.children.iter().map(TraceNode::wire).collect();
        json!([
            duration_to_millis(self.start_offset),
            duration_to_millis(self.stop_offset),
            self.name,
            self.attrs,
            children
        ])
    }
}

#[derive(Debug, Clone)]
pub struct TxnTrace {
    pub start: SystemTime,
    pub duration: Duration,
    pub final_name: String,
    pub request_uri: Option<String>,
    /// Top-level nodes on the primary thread, in completion order.
    pub roots: Vec<TraceNode>,
    pub user_attrs: Value,
    pub agent_attrs: Value,
    pub guid: Option<String>,
    pub synthetics_resource_id: Option<String>,
}

impl TxnTrace {
    fn wire(&self) -> Value {
        // The ROOT node spans the whole transaction and wraps the captured
        // top-level segments.
        let root = json!([
            0.0,
            duration_to_millis(self.duration),
            "ROOT",
            {},
            self.roots.iter().map(TraceNode::wire).collect::<Vec<Value>>()
        ]);
        let trace_data = json!([
            0,
            {},
            {},
            root,
            {
                "agentAttributes": self.agent_attrs,
                "userAttributes": self.user_attrs,
                "intrinsics": {},
            }
        ]);
        json!([
            to_epoch_millis(self.start),
            duration_to_millis(self.duration),
            self.final_name,
            self.request_uri,
            trace_data,
            self.guid,
            Value::Null,
            false,
            Value::Null,
            self.synthetics_resource_id,
        ])
    }
}

/// Keeps the single slowest trace per harvest.
#[derive(Debug, Clone, Default)]
pub struct TxnTraces {
    witness: Option<TxnTrace>,
}

impl TxnTraces {
    pub fn new() -> Self {
        TxnTraces::default()
    }

    pub fn is_empty(&self) -> bool {
        self.witness.is_none()
    }

    pub fn witness(&self) -> Option<&TxnTrace> {
        self.witness.as_ref()
    }

    pub fn observe(&mut self, trace: TxnTrace) {
        match &self.witness {
            Some(current) if current.duration >= trace.duration => {}
            _ => self.witness = Some(trace),
        }
    }

    pub fn merge(&mut self, other: TxnTraces) {
        if let Some(trace) = other.witness {
            self.observe(trace);
        }
    }

    /// `transaction_sample_data` payload: `[run_id, [trace]]`.
    pub fn payload(&self, run_id: &str) -> Option<Value> {
        let trace = self.witness.as_ref()?;
        Some(json!([run_id, [trace.wire()]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(duration_ms: u64) -> TxnTrace {
        TxnTrace {
            start: SystemTime::UNIX_EPOCH + Duration::from_secs(100),
            duration: Duration::from_millis(duration_ms),
            final_name: "WebTransaction/Rust/hello".into(),
            request_uri: Some("/hello".into()),
            roots: vec![TraceNode {
                start_offset: Duration::from_millis(10),
                stop_offset: Duration::from_millis(50),
                name: "Custom/segment".into(),
                attrs: json!({}),
                children: vec![],
            }],
            user_attrs: json!({}),
            agent_attrs: json!({}),
            guid: None,
            synthetics_resource_id: None,
        }
    }

    #[test]
    fn test_witness_keeps_slowest() {
        let mut traces = TxnTraces::new();
        traces.observe(trace(500));
        traces.observe(trace(2000));
        traces.observe(trace(1000));
        assert_eq!(
            traces.witness().unwrap().duration,
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn test_merge_is_witness() {
        let mut live = TxnTraces::new();
        live.observe(trace(800));
        let mut failed = TxnTraces::new();
        failed.observe(trace(3000));
        live.merge(failed);
        assert_eq!(
            live.witness().unwrap().duration,
            Duration::from_millis(3000)
        );
    }

    #[test]
    fn test_payload_shape() {
        let mut traces = TxnTraces::new();
        traces.observe(trace(2000));
        let p = traces.payload("run-9").unwrap();
        assert_eq!(p[0], "run-9");
        let sample = &p[1][0];
        assert_eq!(sample[0], 100_000);
        assert_eq!(sample[1], 2000.0);
        assert_eq!(sample[2], "WebTransaction/Rust/hello");
        // ROOT wraps the captured segment
        let root = &sample[4][3];
        assert_eq!(root[2], "ROOT");
        assert_eq!(root[4][0][2], "Custom/segment");
    }

    #[test]
    fn test_empty_payload_none() {
        assert!(TxnTraces::new().payload("run").is_none());
    }
}
