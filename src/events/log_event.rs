//! Log events
//!
//! Forwarded application log records. The aggregator always counts lines
//! per severity (those become `Logging/lines` metrics) even when event
//! forwarding is disabled or the reservoir is full; the events themselves
//! are priority-sampled like every other stream. A log that carries a
//! trace id inherits that trace's priority so sampled traces keep their
//! logs; otherwise it draws a fresh one.

use crate::errors::RecordError;
use crate::limits::MAX_LOG_MESSAGE_BYTES;
use crate::metric_names::{LOGGING_LINES, LOGGING_LINES_PREFIX};
use crate::metrics::MetricTable;
use crate::priority::Priority;
use crate::reservoir::{Prioritized, Reservoir};
use crate::serialize::now_millis;
use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};

pub const SEVERITY_UNKNOWN: &str = "UNKNOWN";

/// A log record as handed to the facade.
#[derive(Debug, Clone, Default)]
pub struct LogData {
    /// Epoch milliseconds; 0 means "stamp with now".
    pub timestamp: i64,
    /// Empty defaults to "UNKNOWN".
    pub severity: String,
    pub message: String,
    /// Structured context attributes from the host's logger.
    pub context: Option<Value>,
    /// Trace correlation, if the host's logger captured it.
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

impl LogData {
    /// Normalize and validate. Returns the record with defaults applied.
    pub fn validate(mut self) -> Result<LogData, RecordError> {
        if self.message.is_empty() && self.severity.is_empty() && self.context.is_none() {
            return Err(RecordError::LogEmpty);
        }
        if self.message.len() > MAX_LOG_MESSAGE_BYTES {
            return Err(RecordError::LogTooLarge(self.message.len()));
        }
        if self.severity.is_empty() {
            self.severity = SEVERITY_UNKNOWN.to_string();
        }
        if self.timestamp == 0 {
            self.timestamp = now_millis();
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: i64,
    pub severity: String,
    pub message: String,
    pub context: Option<Value>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub priority: Priority,
}

impl Prioritized for LogEvent {
    fn priority(&self) -> Priority {
        self.priority
    }
}

impl LogEvent {
    pub fn wire(&self) -> Value {
        let mut m = Map::new();
        m.insert("timestamp".into(), self.timestamp.into());
        m.insert("message".into(), self.message.clone().into());
        m.insert("level".into(), self.severity.clone().into());
        if let Some(c) = &self.context {
            m.insert("attributes".into(), c.clone());
        }
        if let Some(t) = &self.trace_id {
            m.insert("trace.id".into(), t.clone().into());
        }
        if let Some(s) = &self.span_id {
            m.insert("span.id".into(), s.clone().into());
        }
        Value::Object(m)
    }
}

/// Per-harvest log stream: reservoir plus always-on severity counts.
#[derive(Debug, Clone)]
pub struct LogEventAggregator {
    reservoir: Reservoir<LogEvent>,
    severity_counts: FxHashMap<String, u64>,
    /// Event forwarding off: lines still counted, events discarded.
    forwarding: bool,
}

impl LogEventAggregator {
    pub fn new(capacity: usize, forwarding: bool) -> Self {
        LogEventAggregator {
            reservoir: Reservoir::new(if forwarding { capacity } else { 0 }),
            severity_counts: FxHashMap::default(),
            forwarding,
        }
    }

    pub fn add(&mut self, event: LogEvent) {
        *self
            .severity_counts
            .entry(event.severity.clone())
            .or_insert(0) += 1;
        if self.forwarding {
            self.reservoir.add(event);
        }
    }

    #[inline]
    pub fn reservoir(&self) -> &Reservoir<LogEvent> {
        &self.reservoir
    }

    pub fn num_seen(&self) -> u64 {
        self.reservoir.num_seen()
    }

    pub fn num_saved(&self) -> u64 {
        self.reservoir.num_saved()
    }

    /// Line-count metrics, recorded whether or not forwarding is on.
    pub fn record_metrics(&self, table: &mut MetricTable) {
        let total: u64 = self.severity_counts.values().sum();
        if total == 0 {
            return;
        }
        table.add_count(LOGGING_LINES, total as f64, true);
        for (severity, count) in &self.severity_counts {
            table.add_count(
                &format!("{LOGGING_LINES_PREFIX}{severity}"),
                *count as f64,
                true,
            );
        }
    }

    /// `log_event_data` payload: `[{"common":{"attributes":{…}},"logs":[…]}]`.
    pub fn payload(&self, entity_guid: &str, hostname: &str) -> Option<Value> {
        if self.reservoir.is_empty() {
            return None;
        }
        let logs: Vec<Value> = self.reservoir.as_slice().iter().map(LogEvent::wire).collect();
        Some(json!([{
            "common": {
                "attributes": {
                    "entity.guid": entity_guid,
                    "hostname": hostname,
                }
            },
            "logs": logs,
        }]))
    }

    /// Merge a failed harvest's stream back into this one.
    pub fn merge_failed(&mut self, other: LogEventAggregator) {
        for (severity, count) in other.severity_counts {
            *self.severity_counts.entry(severity).or_insert(0) += count;
        }
        self.reservoir.merge_failed(other.reservoir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(msg: &str, severity: &str) -> LogData {
        LogData {
            timestamp: 123,
            severity: severity.into(),
            message: msg.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_defaults() {
        let d = record("hello", "").validate().unwrap();
        assert_eq!(d.severity, "UNKNOWN");
        assert_eq!(d.timestamp, 123);
    }

    #[test]
    fn test_validate_stamps_now() {
        let d = LogData {
            message: "hello".into(),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(d.timestamp > 0);
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(
            LogData::default().validate().unwrap_err(),
            RecordError::LogEmpty
        );
        // Context alone makes a record non-empty.
        let context_only = LogData {
            context: Some(json!({"request_id": "abc"})),
            ..Default::default()
        };
        assert!(context_only.validate().is_ok());
    }

    #[test]
    fn test_message_size_boundary() {
        let exactly = record(&"x".repeat(MAX_LOG_MESSAGE_BYTES), "INFO");
        assert!(exactly.validate().is_ok());
        let over = record(&"x".repeat(MAX_LOG_MESSAGE_BYTES + 1), "INFO");
        assert_eq!(
            over.validate().unwrap_err(),
            RecordError::LogTooLarge(MAX_LOG_MESSAGE_BYTES + 1)
        );
    }

    fn event(severity: &str, p: f32) -> LogEvent {
        LogEvent {
            timestamp: 1,
            severity: severity.into(),
            message: "m".into(),
            context: None,
            trace_id: None,
            span_id: None,
            priority: Priority::from_value(p),
        }
    }

    #[test]
    fn test_counts_survive_disabled_forwarding() {
        let mut agg = LogEventAggregator::new(100, false);
        agg.add(event("ERROR", 0.5));
        agg.add(event("ERROR", 0.5));
        agg.add(event("INFO", 0.5));
        assert_eq!(agg.num_saved(), 0);
        let mut table = MetricTable::new(std::time::SystemTime::UNIX_EPOCH);
        agg.record_metrics(&mut table);
        assert_eq!(table.get(LOGGING_LINES, "").unwrap().count, 3.0);
        assert_eq!(table.get("Logging/lines/ERROR", "").unwrap().count, 2.0);
        assert_eq!(table.get("Logging/lines/INFO", "").unwrap().count, 1.0);
    }

    #[test]
    fn test_payload_shape() {
        let mut agg = LogEventAggregator::new(10, true);
        let mut e = event("WARN", 0.7);
        e.trace_id = Some("12345678901234567890123456789012".into());
        e.context = Some(json!({"request_id": "abc"}));
        agg.add(e);
        let p = agg.payload("guid-1", "host-1").unwrap();
        assert_eq!(p[0]["common"]["attributes"]["hostname"], "host-1");
        let logs = p[0]["logs"].as_array().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["level"], "WARN");
        assert_eq!(logs[0]["trace.id"], "12345678901234567890123456789012");
        assert_eq!(logs[0]["attributes"]["request_id"], "abc");
    }

    #[test]
    fn test_empty_payload_none() {
        let agg = LogEventAggregator::new(10, true);
        assert!(agg.payload("g", "h").is_none());
    }
}
