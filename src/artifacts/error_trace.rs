//! Error traces
//!
//! Full error detail (message, class, stack, attributes) for a bounded
//! number of errors per harvest. Unlike the event reservoir this is a plain
//! FIFO capped at 20; merge-back appends subject to the same cap.

use crate::limits::MAX_ERROR_TRACES;
use crate::serialize::to_epoch_millis;
use serde_json::{json, Value};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct ErrorTrace {
    pub when: SystemTime,
    pub txn_name: String,
    pub msg: String,
    pub klass: String,
    pub stack: Option<String>,
    pub request_uri: Option<String>,
    pub user_attrs: Value,
    pub agent_attrs: Value,
    pub guid: Option<String>,
}

impl ErrorTrace {
    fn wire(&self) -> Value {
        json!([
            to_epoch_millis(self.when),
            self.txn_name,
            self.msg,
            self.klass,
            {
                "agentAttributes": self.agent_attrs,
                "userAttributes": self.user_attrs,
                "intrinsics": {},
                "stack_trace": self.stack,
                "request_uri": self.request_uri,
            },
            self.guid,
        ])
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorTraces {
    traces: Vec<ErrorTrace>,
}

impl ErrorTraces {
    pub fn new() -> Self {
        ErrorTraces::default()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn observe(&mut self, trace: ErrorTrace) {
        if self.traces.len() < MAX_ERROR_TRACES {
            self.traces.push(trace);
        }
    }

    pub fn merge(&mut self, other: ErrorTraces) {
        for trace in other.traces {
            self.observe(trace);
        }
    }

    /// `error_data` payload: `[run_id, [traces…]]`.
    pub fn payload(&self, run_id: &str) -> Option<Value> {
        if self.traces.is_empty() {
            return None;
        }
        let entries: Vec<Value> = self.traces.iter().map(ErrorTrace::wire).collect();
        Some(json!([run_id, entries]))
    }
}
