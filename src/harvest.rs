//! Harvest engine
//!
//! Owns every accumulator between flushes. Two independent cadences: the
//! fixed 60 s group (metrics, traces, slow queries, error traces) and the
//! event group, whose period and reservoir sizes the connect reply may
//! override. `ready` detaches whatever is due into typed payload entries;
//! a rejected payload's part merges back into the live accumulators via
//! the per-type merge rules.

use crate::artifacts::{ErrorTraces, SlowQueryAggregator, TxnTraces};
use crate::collector::method;
use crate::config::AgentConfig;
use crate::connect_reply::ConnectReply;
use crate::events::{
    events_payload, CustomEvent, ErrorEvent, LogEvent, LogEventAggregator, SpanEvent, TxnEvent,
};
use crate::events::log_event::LogData;
use crate::limits::{
    FIXED_HARVEST_PERIOD, MAX_CUSTOM_EVENTS, MAX_ERROR_EVENTS, MAX_LOG_EVENTS, MAX_SPAN_EVENTS,
    MAX_TXN_EVENTS,
};
use crate::metric_names::*;
use crate::metrics::MetricTable;
use crate::priority::Priority;
use crate::reservoir::Reservoir;
use crate::tracer::HarvestBundle;
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::mem;
use std::time::{Duration, SystemTime};

/// Harvest type bitset.
pub mod harvest_types {
    pub const METRICS_TRACES: u8 = 1 << 0;
    pub const TXN_EVENTS: u8 = 1 << 1;
    pub const CUSTOM_EVENTS: u8 = 1 << 2;
    pub const ERROR_EVENTS: u8 = 1 << 3;
    pub const SPAN_EVENTS: u8 = 1 << 4;
    pub const LOG_EVENTS: u8 = 1 << 5;
    pub const EVENTS: u8 = TXN_EVENTS | CUSTOM_EVENTS | ERROR_EVENTS | SPAN_EVENTS | LOG_EVENTS;
    pub const ALL: u8 = METRICS_TRACES | EVENTS;
}

/// Two-group cadence timer. Each group advances by whole periods so a late
/// tick cannot cause drift.
#[derive(Debug)]
pub struct HarvestTimer {
    fixed_period: Duration,
    event_period: Duration,
    last_fixed: SystemTime,
    last_events: SystemTime,
}

impl HarvestTimer {
    pub fn new(now: SystemTime, event_period: Duration) -> Self {
        HarvestTimer {
            fixed_period: FIXED_HARVEST_PERIOD,
            event_period,
            last_fixed: now,
            last_events: now,
        }
    }

    /// Union of groups whose boundary has passed.
    pub fn ready(&mut self, now: SystemTime) -> u8 {
        let mut types = 0;
        if advance(&mut self.last_fixed, self.fixed_period, now) {
            types |= harvest_types::METRICS_TRACES;
        }
        if advance(&mut self.last_events, self.event_period, now) {
            types |= harvest_types::EVENTS;
        }
        types
    }
}

fn advance(last: &mut SystemTime, period: Duration, now: SystemTime) -> bool {
    if period.is_zero() {
        return false;
    }
    let mut fired = false;
    while now >= *last + period {
        *last += period;
        fired = true;
    }
    fired
}

/// Per-event-type capacities and toggles, resolved from config + reply.
#[derive(Debug, Clone)]
pub struct HarvestLimits {
    pub txn_events: usize,
    pub custom_events: usize,
    pub error_events: usize,
    pub span_events: usize,
    pub log_events: usize,
    pub log_forwarding: bool,
    pub event_period: Duration,
}

impl HarvestLimits {
    pub fn from_config(config: &AgentConfig) -> Self {
        HarvestLimits {
            txn_events: enabled_cap(config.transaction_events.enabled, MAX_TXN_EVENTS),
            custom_events: enabled_cap(config.custom_events.enabled, MAX_CUSTOM_EVENTS),
            error_events: enabled_cap(config.error_collector.capture_events, MAX_ERROR_EVENTS),
            span_events: enabled_cap(config.span_events.enabled, MAX_SPAN_EVENTS),
            log_events: enabled_cap(config.application_logging.enabled, MAX_LOG_EVENTS),
            log_forwarding: config.application_logging.enabled
                && config.application_logging.forwarding_enabled,
            event_period: crate::limits::DEFAULT_EVENT_PERIOD,
        }
    }

    /// Apply reply overrides: collection flags zero out reservoirs, and the
    /// per-type limits and report period replace the defaults.
    pub fn apply_reply(&mut self, config: &AgentConfig, reply: &ConnectReply) {
        self.txn_events = if config.transaction_events.enabled && reply.collect_analytics_events {
            reply.txn_events_limit()
        } else {
            0
        };
        self.custom_events = if config.custom_events.enabled && reply.collect_custom_events {
            reply.custom_events_limit()
        } else {
            0
        };
        self.error_events = if config.error_collector.capture_events && reply.collect_error_events {
            reply.error_events_limit()
        } else {
            0
        };
        self.span_events = if config.span_events.enabled && reply.collect_span_events {
            reply.span_events_limit()
        } else {
            0
        };
        self.log_events = if config.application_logging.enabled {
            reply.log_events_limit()
        } else {
            0
        };
        self.event_period = reply.event_period();
    }
}

fn enabled_cap(enabled: bool, cap: usize) -> usize {
    if enabled {
        cap
    } else {
        0
    }
}

/// Identity fields payloads need.
#[derive(Debug, Clone, Default)]
pub struct HarvestContext {
    pub run_id: String,
    pub entity_guid: String,
    pub hostname: String,
}

/// A detached accumulator awaiting submission; merged back on retryable
/// failure.
#[derive(Debug)]
pub enum HarvestPart {
    Metrics(MetricTable),
    SlowQueries(SlowQueryAggregator),
    TxnTraces(TxnTraces),
    ErrorTraces(ErrorTraces),
    TxnEvents(Reservoir<TxnEvent>),
    CustomEvents(Reservoir<CustomEvent>),
    ErrorEvents(Reservoir<ErrorEvent>),
    SpanEvents(Reservoir<SpanEvent>),
    LogEvents(LogEventAggregator),
}

#[derive(Debug)]
pub struct PayloadEntry {
    pub method: &'static str,
    pub payload: Value,
    pub part: HarvestPart,
}

/// The live accumulators for one application run.
pub struct Harvest {
    pub metrics: MetricTable,
    pub slow_queries: SlowQueryAggregator,
    pub txn_traces: TxnTraces,
    pub error_traces: ErrorTraces,
    pub txn_events: Reservoir<TxnEvent>,
    pub custom_events: Reservoir<CustomEvent>,
    pub error_events: Reservoir<ErrorEvent>,
    pub span_events: Reservoir<SpanEvent>,
    pub log_events: LogEventAggregator,
    /// trace id -> priority for the current cycle; lets logs inherit their
    /// trace's sampling priority.
    trace_priorities: FxHashMap<String, Priority>,
    limits: HarvestLimits,
}

impl Harvest {
    pub fn new(now: SystemTime, limits: HarvestLimits) -> Self {
        Harvest {
            metrics: MetricTable::new(now),
            slow_queries: SlowQueryAggregator::new(),
            txn_traces: TxnTraces::new(),
            error_traces: ErrorTraces::new(),
            txn_events: Reservoir::new(limits.txn_events),
            custom_events: Reservoir::new(limits.custom_events),
            error_events: Reservoir::new(limits.error_events),
            span_events: Reservoir::new(limits.span_events),
            log_events: LogEventAggregator::new(limits.log_events, limits.log_forwarding),
            trace_priorities: FxHashMap::default(),
            limits,
        }
    }

    pub fn set_limits(&mut self, limits: HarvestLimits) {
        self.limits = limits;
    }

    pub fn limits(&self) -> &HarvestLimits {
        &self.limits
    }

    /// Fold a finished transaction in. Single-writer: only the harvest
    /// thread calls this.
    pub fn apply_bundle(&mut self, bundle: HarvestBundle) {
        self.metrics.merge(bundle.metrics);
        if let Some(event) = bundle.txn_event {
            self.txn_events.add(event);
        }
        for e in bundle.error_events {
            self.error_events.add(e);
        }
        for t in bundle.error_traces {
            self.error_traces.observe(t);
        }
        for s in bundle.span_events {
            self.span_events.add(s);
        }
        if let Some(trace) = bundle.txn_trace {
            self.txn_traces.observe(trace);
        }
        for q in bundle.slow_queries {
            self.slow_queries.observe(q);
        }
        if let Some((trace_id, priority)) = bundle.trace_priority {
            self.trace_priorities.insert(trace_id, priority);
        }
    }

    /// Record a validated log line, inheriting the owning trace's priority
    /// when the record carries a known trace id.
    pub fn record_log(&mut self, data: LogData, rng: &mut SmallRng) {
        let priority = data
            .trace_id
            .as_ref()
            .and_then(|id| self.trace_priorities.get(id).copied())
            .unwrap_or_else(|| Priority::random(rng));
        self.log_events.add(LogEvent {
            timestamp: data.timestamp,
            severity: data.severity,
            message: data.message,
            context: data.context,
            trace_id: data.trace_id,
            span_id: data.span_id,
            priority,
        });
    }

    pub fn record_custom_metric(&mut self, name: &str, value: f64) {
        self.metrics
            .add_value(&format!("{CUSTOM_PREFIX}{name}"), "", value, false);
    }

    pub fn add_custom_event(&mut self, event: CustomEvent) {
        self.custom_events.add(event);
    }

    /// Count submission-channel drops.
    pub fn record_dropped_events(&mut self, dropped: u64) {
        if dropped > 0 {
            self.metrics
                .add_count(SUPPORT_EVENTS_DROPPED, dropped as f64, true);
        }
    }

    /// Detach everything in `types` into payload entries, installing fresh
    /// accumulators with the current limits.
    pub fn ready(&mut self, types: u8, now: SystemTime, ctx: &HarvestContext) -> Vec<PayloadEntry> {
        let mut out = Vec::new();

        if types & harvest_types::TXN_EVENTS != 0 {
            let events = mem::replace(&mut self.txn_events, Reservoir::new(self.limits.txn_events));
            self.metrics
                .add_count(SUPPORT_TXN_EVENTS_SEEN, events.num_seen() as f64, true);
            self.metrics
                .add_count(SUPPORT_TXN_EVENTS_SENT, events.num_saved() as f64, true);
            self.trace_priorities.clear();
            if let Some(payload) = events_payload(&ctx.run_id, &events, TxnEvent::wire) {
                out.push(PayloadEntry {
                    method: method::TXN_EVENTS,
                    payload,
                    part: HarvestPart::TxnEvents(events),
                });
            }
        }
        if types & harvest_types::CUSTOM_EVENTS != 0 {
            let events = mem::replace(
                &mut self.custom_events,
                Reservoir::new(self.limits.custom_events),
            );
            self.metrics
                .add_count(SUPPORT_CUSTOM_EVENTS_SEEN, events.num_seen() as f64, true);
            self.metrics
                .add_count(SUPPORT_CUSTOM_EVENTS_SENT, events.num_saved() as f64, true);
            if let Some(payload) = events_payload(&ctx.run_id, &events, CustomEvent::wire) {
                out.push(PayloadEntry {
                    method: method::CUSTOM_EVENTS,
                    payload,
                    part: HarvestPart::CustomEvents(events),
                });
            }
        }
        if types & harvest_types::ERROR_EVENTS != 0 {
            let events = mem::replace(
                &mut self.error_events,
                Reservoir::new(self.limits.error_events),
            );
            self.metrics
                .add_count(SUPPORT_ERROR_EVENTS_SEEN, events.num_seen() as f64, true);
            self.metrics
                .add_count(SUPPORT_ERROR_EVENTS_SENT, events.num_saved() as f64, true);
            if let Some(payload) = events_payload(&ctx.run_id, &events, ErrorEvent::wire) {
                out.push(PayloadEntry {
                    method: method::ERROR_EVENTS,
                    payload,
                    part: HarvestPart::ErrorEvents(events),
                });
            }
        }
        if types & harvest_types::SPAN_EVENTS != 0 {
            let events = mem::replace(
                &mut self.span_events,
                Reservoir::new(self.limits.span_events),
            );
            self.metrics
                .add_count(SUPPORT_SPAN_EVENTS_SEEN, events.num_seen() as f64, true);
            self.metrics
                .add_count(SUPPORT_SPAN_EVENTS_SENT, events.num_saved() as f64, true);
            if let Some(payload) = events_payload(&ctx.run_id, &events, SpanEvent::wire) {
                out.push(PayloadEntry {
                    method: method::SPAN_EVENTS,
                    payload,
                    part: HarvestPart::SpanEvents(events),
                });
            }
        }
        if types & harvest_types::LOG_EVENTS != 0 {
            let logs = mem::replace(
                &mut self.log_events,
                LogEventAggregator::new(self.limits.log_events, self.limits.log_forwarding),
            );
            logs.record_metrics(&mut self.metrics);
            self.metrics
                .add_count(SUPPORT_LOG_EVENTS_SEEN, logs.num_seen() as f64, true);
            self.metrics
                .add_count(SUPPORT_LOG_EVENTS_SENT, logs.num_saved() as f64, true);
            if let Some(payload) = logs.payload(&ctx.entity_guid, &ctx.hostname) {
                out.push(PayloadEntry {
                    method: method::LOG_EVENTS,
                    payload,
                    part: HarvestPart::LogEvents(logs),
                });
            }
        }
        if types & harvest_types::METRICS_TRACES != 0 {
            let metrics = mem::replace(&mut self.metrics, MetricTable::new(now));
            if !metrics.is_empty() {
                let payload = metrics.payload(&ctx.run_id, now);
                out.push(PayloadEntry {
                    method: method::METRIC_DATA,
                    payload,
                    part: HarvestPart::Metrics(metrics),
                });
            }
            let slow = mem::take(&mut self.slow_queries);
            if let Some(payload) = slow.payload() {
                out.push(PayloadEntry {
                    method: method::SLOW_SQLS,
                    payload,
                    part: HarvestPart::SlowQueries(slow),
                });
            }
            let traces = mem::take(&mut self.txn_traces);
            if let Some(payload) = traces.payload(&ctx.run_id) {
                out.push(PayloadEntry {
                    method: method::TXN_TRACES,
                    payload,
                    part: HarvestPart::TxnTraces(traces),
                });
            }
            let errors = mem::take(&mut self.error_traces);
            if let Some(payload) = errors.payload(&ctx.run_id) {
                out.push(PayloadEntry {
                    method: method::ERROR_TRACES,
                    payload,
                    part: HarvestPart::ErrorTraces(errors),
                });
            }
        }
        out
    }

    /// Merge a rejected payload's data back for the next attempt, honoring
    /// each type's merge rules.
    pub fn merge_failed_part(&mut self, part: HarvestPart) {
        match part {
            HarvestPart::Metrics(table) => self.metrics.merge(table),
            HarvestPart::SlowQueries(sq) => self.slow_queries.merge(sq),
            HarvestPart::TxnTraces(traces) => self.txn_traces.merge(traces),
            HarvestPart::ErrorTraces(traces) => self.error_traces.merge(traces),
            HarvestPart::TxnEvents(r) => self.txn_events.merge_failed(r),
            HarvestPart::CustomEvents(r) => self.custom_events.merge_failed(r),
            HarvestPart::ErrorEvents(r) => self.error_events.merge_failed(r),
            HarvestPart::SpanEvents(r) => self.span_events.merge_failed(r),
            HarvestPart::LogEvents(agg) => self.log_events.merge_failed(agg),
        }
    }
}
