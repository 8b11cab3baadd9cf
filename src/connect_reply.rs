//! Connect reply
//!
//! The server's answer to `connect`. Everything is optional with agent-side
//! defaults so an old or minimal collector reply still yields a working
//! run. The reply owns the per-event-type harvest limits and report period
//! that the harvest engine applies on its next cycle.

use crate::limits::{
    DEFAULT_EVENT_PERIOD, MAX_CUSTOM_EVENTS, MAX_ERROR_EVENTS, MAX_LOG_EVENTS, MAX_SPAN_EVENTS,
    MAX_TXN_EVENTS,
};
use crate::metric_rules::MetricRule;
use serde::Deserialize;
use std::time::Duration;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventHarvestLimits {
    #[serde(default)]
    pub analytic_event_data: Option<usize>,
    #[serde(default)]
    pub custom_event_data: Option<usize>,
    #[serde(default)]
    pub error_event_data: Option<usize>,
    #[serde(default)]
    pub span_event_data: Option<usize>,
    #[serde(default)]
    pub log_event_data: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventHarvestConfig {
    #[serde(default)]
    pub report_period_ms: Option<u64>,
    #[serde(default)]
    pub harvest_limits: EventHarvestLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectReply {
    pub agent_run_id: String,
    #[serde(default)]
    pub entity_guid: String,
    #[serde(default = "default_true")]
    pub collect_analytics_events: bool,
    #[serde(default = "default_true")]
    pub collect_custom_events: bool,
    #[serde(default = "default_true")]
    pub collect_traces: bool,
    #[serde(default = "default_true")]
    pub collect_errors: bool,
    #[serde(default = "default_true")]
    pub collect_error_events: bool,
    #[serde(default = "default_true")]
    pub collect_span_events: bool,
    /// Apdex threshold in seconds.
    #[serde(default)]
    pub apdex_t: Option<f64>,
    #[serde(default)]
    pub metric_name_rules: Vec<MetricRule>,
    #[serde(default)]
    pub trusted_account_key: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub primary_application_id: String,
    /// Accounts whose synthetics/legacy payloads are honored.
    #[serde(default)]
    pub trusted_account_ids: Vec<i64>,
    /// XOR key for obfuscated headers.
    #[serde(default)]
    pub encoding_key: String,
    #[serde(default)]
    pub sampling_target: Option<u64>,
    #[serde(default)]
    pub sample_everything: bool,
    #[serde(default)]
    pub sample_nothing: bool,
    #[serde(default)]
    pub event_harvest_config: EventHarvestConfig,
}

impl Default for ConnectReply {
    fn default() -> Self {
        ConnectReply {
            agent_run_id: String::new(),
            entity_guid: String::new(),
            collect_analytics_events: true,
            collect_custom_events: true,
            collect_traces: true,
            collect_errors: true,
            collect_error_events: true,
            collect_span_events: true,
            apdex_t: None,
            metric_name_rules: Vec::new(),
            trusted_account_key: String::new(),
            account_id: String::new(),
            primary_application_id: String::new(),
            trusted_account_ids: Vec::new(),
            encoding_key: String::new(),
            sampling_target: None,
            sample_everything: false,
            sample_nothing: false,
            event_harvest_config: EventHarvestConfig::default(),
        }
    }
}

impl ConnectReply {
    /// Event flush cadence: server override or the 60 s default.
    pub fn event_period(&self) -> Duration {
        self.event_harvest_config
            .report_period_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_EVENT_PERIOD)
    }

    pub fn apdex_threshold(&self, fallback: Duration) -> Duration {
        match self.apdex_t {
            Some(t) if t > 0.0 => Duration::from_secs_f64(t),
            _ => fallback,
        }
    }

    pub fn txn_events_limit(&self) -> usize {
        self.event_harvest_config
            .harvest_limits
            .analytic_event_data
            .unwrap_or(MAX_TXN_EVENTS)
    }

    pub fn custom_events_limit(&self) -> usize {
        self.event_harvest_config
            .harvest_limits
            .custom_event_data
            .unwrap_or(MAX_CUSTOM_EVENTS)
    }

    pub fn error_events_limit(&self) -> usize {
        self.event_harvest_config
            .harvest_limits
            .error_event_data
            .unwrap_or(MAX_ERROR_EVENTS)
    }

    pub fn span_events_limit(&self) -> usize {
        self.event_harvest_config
            .harvest_limits
            .span_event_data
            .unwrap_or(MAX_SPAN_EVENTS)
    }

    pub fn log_events_limit(&self) -> usize {
        self.event_harvest_config
            .harvest_limits
            .log_event_data
            .unwrap_or(MAX_LOG_EVENTS)
    }

    pub fn sampler_target(&self) -> u64 {
        self.sampling_target.unwrap_or(10)
    }
}
