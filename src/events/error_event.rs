//! Error events
//!
//! One event per observed error, sampled into a small reservoir (default
//! capacity 100). Priority is the owning transaction's priority so sampled
//! traces keep their errors.

use crate::priority::Priority;
use crate::reservoir::Prioritized;
use crate::serialize::{duration_to_seconds, to_epoch_millis};
use serde_json::{json, Map, Value};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub klass: String,
    pub msg: String,
    pub when: SystemTime,
    pub txn_name: String,
    pub duration: Duration,
    pub priority: Priority,
    pub sampled: bool,
    pub guid: Option<String>,
    pub trace_id: Option<String>,
    pub user_attrs: Value,
    pub agent_attrs: Value,
}

impl Prioritized for ErrorEvent {
    fn priority(&self) -> Priority {
        self.priority
    }
}

impl ErrorEvent {
    pub fn wire(&self) -> Value {
        let mut i = Map::new();
        i.insert("type".into(), "TransactionError".into());
        i.insert("error.class".into(), self.klass.clone().into());
        i.insert("error.message".into(), self.msg.clone().into());
        i.insert("timestamp".into(), to_epoch_millis(self.when).into());
        i.insert("transactionName".into(), self.txn_name.clone().into());
        i.insert("duration".into(), json!(duration_to_seconds(self.duration)));
        if let Some(guid) = &self.guid {
            i.insert("guid".into(), guid.clone().into());
            i.insert("priority".into(), json!(self.priority.value()));
            i.insert("sampled".into(), self.sampled.into());
        }
        if let Some(trace_id) = &self.trace_id {
            i.insert("traceId".into(), trace_id.clone().into());
        }
        json!([Value::Object(i), self.user_attrs, self.agent_attrs])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let e = ErrorEvent {
            klass: "MyError".into(),
            msg: "oops".into(),
            when: SystemTime::UNIX_EPOCH + Duration::from_secs(5),
            txn_name: "WebTransaction/Rust/hello".into(),
            duration: Duration::from_millis(250),
            priority: Priority::from_value(1.25),
            sampled: true,
            guid: Some("deadbeefdeadbeef".into()),
            trace_id: Some("12345678901234567890123456789012".into()),
            user_attrs: json!({}),
            agent_attrs: json!({"httpResponseCode": "500"}),
        };
        let w = e.wire();
        assert_eq!(w[0]["type"], "TransactionError");
        assert_eq!(w[0]["error.class"], "MyError");
        assert_eq!(w[0]["error.message"], "oops");
        assert_eq!(w[0]["timestamp"], 5000);
        assert_eq!(w[0]["duration"], 0.25);
        assert_eq!(w[0]["sampled"], true);
        assert_eq!(w[2]["httpResponseCode"], "500");
    }
}
