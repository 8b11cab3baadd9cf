//! Span events
//!
//! One span per finished segment of a sampled transaction, plus a root span
//! per transaction flagged as the entry point. Category-specific fields
//! (http, datastore, message) land in agent attributes.

use crate::priority::Priority;
use crate::reservoir::Prioritized;
use crate::serialize::{duration_to_seconds, to_epoch_millis};
use serde_json::{json, Map, Value};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanCategory {
    Generic,
    Datastore,
    Http,
    Message,
}

impl SpanCategory {
    pub fn label(self) -> &'static str {
        match self {
            SpanCategory::Generic => "generic",
            SpanCategory::Datastore => "datastore",
            SpanCategory::Http => "http",
            SpanCategory::Message => "message",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpanEvent {
    pub guid: String,
    pub trace_id: String,
    pub txn_id: String,
    /// Absent on the root span of a trace with no inbound parent.
    pub parent_id: Option<String>,
    pub name: String,
    pub category: SpanCategory,
    pub start: SystemTime,
    pub duration: Duration,
    pub is_entrypoint: bool,
    pub priority: Priority,
    pub sampled: bool,
    pub user_attrs: Value,
    pub agent_attrs: Value,
}

impl Prioritized for SpanEvent {
    fn priority(&self) -> Priority {
        self.priority
    }
}

impl SpanEvent {
    pub fn wire(&self) -> Value {
        let mut i = Map::new();
        i.insert("type".into(), "Span".into());
        i.insert("guid".into(), self.guid.clone().into());
        i.insert("traceId".into(), self.trace_id.clone().into());
        i.insert("transactionId".into(), self.txn_id.clone().into());
        if let Some(parent) = &self.parent_id {
            i.insert("parentId".into(), parent.clone().into());
        }
        i.insert("name".into(), self.name.clone().into());
        i.insert("category".into(), self.category.label().into());
        i.insert("timestamp".into(), to_epoch_millis(self.start).into());
        i.insert("duration".into(), json!(duration_to_seconds(self.duration)));
        i.insert("priority".into(), json!(self.priority.value()));
        i.insert("sampled".into(), self.sampled.into());
        if self.is_entrypoint {
            i.insert("nr.entryPoint".into(), true.into());
        }
        json!([Value::Object(i), self.user_attrs, self.agent_attrs])
    }
}
