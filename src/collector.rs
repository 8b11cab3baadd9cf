//! Collector protocol client
//!
//! The core depends only on the [`CollectorTransport`] contract:
//! `submit(endpoint, payload)` resolving to accepted / retry / too-large /
//! restart / fatal / drop. [`HttpTransport`] is the production instance
//! (HTTP+JSON against `/agent_listener/invoke_raw_method`); tests inject
//! their own.
//!
//! This module also owns the connect-side pure functions: preconnect host
//! derivation from the license region prefix, the connect payload, and the
//! exponential backoff schedule.

use crate::config::AgentConfig;
use crate::environment::{environment_entries, metadata_env, UtilizationData};
use crate::limits::{AGENT_LANGUAGE, AGENT_VERSION, CONNECT_BACKOFF_SECS, PROTOCOL_VERSION};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Endpoint method selectors.
pub mod method {
    pub const PRECONNECT: &str = "preconnect";
    pub const CONNECT: &str = "connect";
    pub const METRIC_DATA: &str = "metric_data";
    pub const TXN_EVENTS: &str = "analytic_event_data";
    pub const CUSTOM_EVENTS: &str = "custom_event_data";
    pub const ERROR_EVENTS: &str = "error_event_data";
    pub const SPAN_EVENTS: &str = "span_event_data";
    pub const LOG_EVENTS: &str = "log_event_data";
    pub const TXN_TRACES: &str = "transaction_sample_data";
    pub const SLOW_SQLS: &str = "sql_trace_data";
    pub const ERROR_TRACES: &str = "error_data";
}

/// What became of a submission.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// 2xx; carries the decoded `return_value` when the endpoint returns one.
    Accepted(Option<Value>),
    /// Transient failure; keep the data and retry next cycle.
    Retry,
    /// Payload rejected for size; event payloads split and resubmit.
    TooLarge,
    /// The run is stale; reconnect from preconnect.
    Restart,
    /// Terminal (bad license, host rejection); stop harvesting.
    Fatal,
    /// Non-retryable rejection; discard this payload only.
    Drop,
}

#[derive(Debug)]
pub struct SubmitRequest<'a> {
    pub method: &'static str,
    pub run_id: Option<&'a str>,
    pub payload: &'a Value,
}

pub trait CollectorTransport: Send + Sync {
    fn submit(&self, host: &str, license: &str, req: &SubmitRequest<'_>) -> SubmitOutcome;
}

/// Map a collector HTTP status to an outcome.
pub fn outcome_for_status(status: u16) -> SubmitOutcome {
    match status {
        200 | 202 => SubmitOutcome::Accepted(None),
        401 | 409 => SubmitOutcome::Restart,
        410 => SubmitOutcome::Fatal,
        413 | 414 => SubmitOutcome::TooLarge,
        408 | 429 => SubmitOutcome::Retry,
        s if (500..600).contains(&s) => SubmitOutcome::Retry,
        _ => SubmitOutcome::Drop,
    }
}

/// Production transport: HTTP+JSON over TLS with gzip.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(20))
            .gzip(true)
            .build()
            .unwrap_or_default();
        HttpTransport { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        HttpTransport::new()
    }
}

impl CollectorTransport for HttpTransport {
    fn submit(&self, host: &str, license: &str, req: &SubmitRequest<'_>) -> SubmitOutcome {
        let mut url = format!(
            "https://{host}/agent_listener/invoke_raw_method?marshal_format=json&protocol_version={PROTOCOL_VERSION}&method={}&license_key={license}",
            req.method
        );
        if let Some(run_id) = req.run_id {
            url.push_str("&run_id=");
            url.push_str(run_id);
        }
        let response = match self.client.post(&url).json(req.payload).send() {
            Ok(r) => r,
            Err(e) => {
                warn!(method = req.method, error = %e, "collector request failed");
                return SubmitOutcome::Retry;
            }
        };
        let status = response.status().as_u16();
        debug!(method = req.method, status, "collector response");
        match outcome_for_status(status) {
            SubmitOutcome::Accepted(_) => {
                let body: Option<Value> = response.json().ok();
                let return_value = body.and_then(|mut b| {
                    b.get_mut("return_value").map(Value::take)
                });
                SubmitOutcome::Accepted(return_value)
            }
            other => other,
        }
    }
}

/// Preconnect host: a 4-6 character region prefix terminated by `x` within
/// the license's first characters selects the regional collector; otherwise
/// the configured override or the default host.
pub fn preconnect_host(license: &str, host_override: Option<&str>) -> String {
    if let Some(idx) = license.find('x') {
        if (4..=6).contains(&idx) {
            return format!("collector.{}.nr-data.net", &license[..idx]);
        }
    }
    match host_override {
        Some(h) => h.to_string(),
        None => "collector.newrelic.com".to_string(),
    }
}

/// Connect retry delay by attempt number; negative attempts get the max.
pub fn connect_backoff(attempt: i32) -> Duration {
    let secs = if attempt < 0 {
        CONNECT_BACKOFF_SECS[CONNECT_BACKOFF_SECS.len() - 1]
    } else {
        let idx = (attempt as usize).min(CONNECT_BACKOFF_SECS.len() - 1);
        CONNECT_BACKOFF_SECS[idx]
    };
    Duration::from_secs(secs)
}

/// `preconnect` request body.
pub fn preconnect_payload(config: &AgentConfig) -> Value {
    json!([{
        "security_policies_token": config.security_policies_token,
        "high_security": config.high_security,
    }])
}

/// `connect` request body: an array of one object.
pub fn connect_payload(config: &AgentConfig, hostname: &str, pid: u32) -> Value {
    let app_names: Vec<&str> = config.app_names();
    let labels: Vec<Value> = config
        .labels
        .iter()
        .map(|(k, v)| json!({ "label_type": k, "label_value": v }))
        .collect();
    let environment: Vec<Value> = environment_entries()
        .into_iter()
        .map(|(k, v)| json!([k, v]))
        .collect();
    let utilization = UtilizationData::detect(hostname.to_string());
    let metadata = metadata_env();

    // Settings block: a copy of the user configuration with reference
    // fields cloned. The license never rides along.
    let settings = json!({
        "app_name": config.app_name,
        "enabled": config.enabled,
        "high_security": config.high_security,
        "apdex_threshold_ms": config.apdex_threshold.as_millis() as u64,
        "transaction_events.enabled": config.transaction_events.enabled,
        "span_events.enabled": config.span_events.enabled,
        "custom_events.enabled": config.custom_events.enabled,
        "error_collector.enabled": config.error_collector.enabled,
        "transaction_tracer.enabled": config.transaction_tracer.enabled,
        "distributed_tracer.enabled": config.distributed_tracer.enabled,
        "application_logging.enabled": config.application_logging.enabled,
        "application_logging.forwarding.enabled": config.application_logging.forwarding_enabled,
    });

    let mut body = serde_json::Map::new();
    body.insert("pid".into(), pid.into());
    body.insert("language".into(), AGENT_LANGUAGE.into());
    body.insert("agent_version".into(), AGENT_VERSION.into());
    body.insert("host".into(), hostname.into());
    body.insert("settings".into(), settings);
    body.insert("app_name".into(), json!(app_names));
    body.insert("high_security".into(), config.high_security.into());
    body.insert("labels".into(), Value::Array(labels));
    body.insert("environment".into(), Value::Array(environment));
    body.insert("identifier".into(), app_names.join(";").into());
    body.insert(
        "utilization".into(),
        serde_json::to_value(&utilization).unwrap_or(Value::Null),
    );
    if !config.security_policies_token.is_empty() {
        body.insert(
            "security_policies".into(),
            json!({ "token": config.security_policies_token }),
        );
    }
    if !metadata.is_empty() {
        body.insert(
            "metadata".into(),
            serde_json::to_value(&metadata).unwrap_or(Value::Null),
        );
    }
    body.insert(
        "event_harvest_config".into(),
        json!({
            "harvest_limits": {
                "analytic_event_data": crate::limits::MAX_TXN_EVENTS,
                "custom_event_data": crate::limits::MAX_CUSTOM_EVENTS,
                "error_event_data": crate::limits::MAX_ERROR_EVENTS,
                "span_event_data": crate::limits::MAX_SPAN_EVENTS,
                "log_event_data": crate::limits::MAX_LOG_EVENTS,
            }
        }),
    );
    Value::Array(vec![Value::Object(body)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preconnect_region_hosts() {
        assert_eq!(
            preconnect_host("eu01xx6789012345678901234567890123456789", None),
            "collector.eu01.nr-data.net"
        );
        assert_eq!(
            preconnect_host("gov01x6789012345678901234567890123456789", None),
            "collector.gov01.nr-data.net"
        );
        assert_eq!(
            preconnect_host("foo001x789012345678901234567890123456789", None),
            "collector.foo001.nr-data.net"
        );
    }

    #[test]
    fn test_preconnect_default_and_override() {
        // 40 hex chars contain no region delimiter.
        let hex = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(preconnect_host(hex, None), "collector.newrelic.com");
        assert_eq!(
            preconnect_host(hex, Some("proxy.internal:8443")),
            "proxy.internal:8443"
        );
        // Too-short and too-long prefixes do not select a region.
        assert_eq!(
            preconnect_host("abx7456789012345678901234567890123456789", None),
            "collector.newrelic.com"
        );
    }

    #[test]
    fn test_backoff_schedule() {
        let cases = [
            (0, 15),
            (2, 30),
            (5, 300),
            (6, 300),
            (100, 300),
            (-5, 300),
        ];
        for (attempt, want) in cases {
            assert_eq!(
                connect_backoff(attempt),
                Duration::from_secs(want),
                "attempt {attempt}"
            );
        }
        assert_eq!(connect_backoff(1), Duration::from_secs(15));
        assert_eq!(connect_backoff(3), Duration::from_secs(60));
        assert_eq!(connect_backoff(4), Duration::from_secs(120));
    }

    #[test]
    fn test_outcome_for_status() {
        assert!(matches!(outcome_for_status(200), SubmitOutcome::Accepted(_)));
        assert!(matches!(outcome_for_status(401), SubmitOutcome::Restart));
        assert!(matches!(outcome_for_status(409), SubmitOutcome::Restart));
        assert!(matches!(outcome_for_status(410), SubmitOutcome::Fatal));
        assert!(matches!(outcome_for_status(413), SubmitOutcome::TooLarge));
        assert!(matches!(outcome_for_status(429), SubmitOutcome::Retry));
        assert!(matches!(outcome_for_status(503), SubmitOutcome::Retry));
        assert!(matches!(outcome_for_status(400), SubmitOutcome::Drop));
    }

    #[test]
    fn test_connect_payload_shape() {
        let mut config = AgentConfig::new(
            "My App;Second",
            "0123456789012345678901234567890123456789",
        );
        config.labels.push(("env".into(), "prod".into()));
        let p = connect_payload(&config, "host-1", 4242);
        let obj = &p[0];
        assert_eq!(obj["pid"], 4242);
        assert_eq!(obj["language"], "rust");
        assert_eq!(obj["host"], "host-1");
        assert_eq!(obj["app_name"], json!(["My App", "Second"]));
        assert_eq!(obj["identifier"], "My App;Second");
        assert_eq!(obj["labels"][0]["label_type"], "env");
        assert_eq!(obj["high_security"], false);
        assert!(obj.get("security_policies").is_none());
        assert!(obj["settings"].get("license").is_none());
        assert_eq!(
            obj["event_harvest_config"]["harvest_limits"]["error_event_data"],
            100
        );
        assert_eq!(obj["utilization"]["metadata_version"], 5);
    }

    #[test]
    fn test_preconnect_payload_carries_policies_token() {
        let mut config =
            AgentConfig::new("App", "0123456789012345678901234567890123456789");
        config.security_policies_token = "ff-aa".into();
        let p = preconnect_payload(&config);
        assert_eq!(p[0]["security_policies_token"], "ff-aa");
    }
}
