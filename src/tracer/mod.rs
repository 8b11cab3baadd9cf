//! Transaction tracer
//!
//! The segment-stack state machine. A [`Transaction`] owns an arena of
//! tracing threads; segment tokens address (thread, depth, stamp) so the
//! tracer can detect out-of-order and stale finishes without back-pointers.
//! Closing the transaction resolves everything into an immutable
//! [`HarvestBundle`] that the application submits to the harvest thread.

pub mod breakdown;
pub mod segment;
mod thread_state;

pub use segment::{
    MessageAction, MessageDestination, SegmentEnd, SegmentKind, SegmentToken,
};

use crate::artifacts::{ErrorTrace, SlowQuery, TraceNode, TxnTrace};
use crate::attributes::{dest, AttributeConfig, Attributes, AttributeValue};
use crate::config::TraceThreshold;
use crate::dt::{
    new_span_id, new_trace_id, parse_inbound, AcceptError, DtSampler, InboundCaller,
    InboundPayload, OutboundContext, TransportType, LEGACY_HEADER, TRACEPARENT_HEADER,
    TRACESTATE_HEADER,
};
use crate::error_data::ErrorData;
use crate::errors::SegmentError;
use crate::events::span_event::{SpanCategory, SpanEvent};
use crate::events::{ErrorEvent, TxnEvent};
use crate::limits::APDEX_FAILING_MULTIPLIER;
use crate::metric_names::UNKNOWN_CALLER;
use crate::metrics::{ApdexZone, MetricTable};
use crate::priority::Priority;
use crate::serialize::{from_epoch_millis, now_millis};
use crate::synthetics::{Synthetics, SYNTHETICS_HEADER};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use thread_state::{OpenSegment, ThreadState};

/// Snapshot of everything a transaction needs from config and the connect
/// reply, taken at start so the transaction never touches shared state.
#[derive(Debug, Clone)]
pub struct TxnSettings {
    pub is_web: bool,
    pub apdex_threshold: Duration,
    pub tracer_enabled: bool,
    pub tracer_threshold: TraceThreshold,
    pub segment_threshold: Duration,
    pub collect_traces: bool,
    pub collect_txn_events: bool,
    pub collect_error_events: bool,
    pub collect_error_traces: bool,
    pub collect_span_events: bool,
    pub slow_queries_enabled: bool,
    pub slow_query_threshold: Duration,
    pub dt_enabled: bool,
    pub trusted_key: String,
    pub account_id: String,
    pub primary_app_id: String,
    pub high_security: bool,
    pub allow_raw_exception_messages: bool,
    pub custom_parameters_allowed: bool,
    pub ignore_status_codes: Vec<u16>,
    pub encoding_key: Vec<u8>,
    pub trusted_accounts: Vec<i64>,
    pub attr_config: Arc<AttributeConfig>,
    pub sampler: Arc<Mutex<DtSampler>>,
}

impl Default for TxnSettings {
    fn default() -> Self {
        TxnSettings {
            is_web: true,
            apdex_threshold: Duration::from_millis(500),
            tracer_enabled: true,
            tracer_threshold: TraceThreshold::ApdexFailing,
            segment_threshold: Duration::ZERO,
            collect_traces: true,
            collect_txn_events: true,
            collect_error_events: true,
            collect_error_traces: true,
            collect_span_events: true,
            slow_queries_enabled: true,
            slow_query_threshold: Duration::from_millis(10),
            dt_enabled: true,
            trusted_key: "123".to_string(),
            account_id: "123".to_string(),
            primary_app_id: "456".to_string(),
            high_security: false,
            allow_raw_exception_messages: true,
            custom_parameters_allowed: true,
            ignore_status_codes: vec![404],
            encoding_key: Vec::new(),
            trusted_accounts: Vec::new(),
            attr_config: Arc::new(AttributeConfig::default()),
            sampler: Arc::new(Mutex::new(DtSampler::new(false, false, 10, Instant::now()))),
        }
    }
}

/// Everything a finished transaction hands to the harvest thread. Immutable
/// once built; the transaction itself is consumed.
#[derive(Debug)]
pub struct HarvestBundle {
    pub metrics: MetricTable,
    pub txn_event: Option<TxnEvent>,
    pub error_events: Vec<ErrorEvent>,
    pub error_traces: Vec<ErrorTrace>,
    pub span_events: Vec<SpanEvent>,
    pub txn_trace: Option<TxnTrace>,
    pub slow_queries: Vec<SlowQuery>,
    /// Lets same-cycle log records inherit this trace's priority.
    pub trace_priority: Option<(String, Priority)>,
}

/// Slow query candidate captured before the final name is known.
#[derive(Debug, Clone)]
struct PendingSlowQuery {
    metric_name: String,
    query: String,
    duration: Duration,
    params: serde_json::Value,
}

pub struct Transaction {
    name: String,
    start: SystemTime,
    settings: TxnSettings,
    threads: Vec<ThreadState>,
    errors: Vec<ErrorData>,
    attrs: Attributes,
    priority: Priority,
    sampled: Option<bool>,
    txn_id: String,
    trace_id: String,
    root_span_id: String,
    inbound: Option<InboundPayload>,
    inbound_transport: TransportType,
    outbound_inserted: bool,
    synthetics: Option<Synthetics>,
    finished_segments: Vec<SegmentEnd>,
    pending_slow_queries: Vec<PendingSlowQuery>,
    rng: SmallRng,
    order_violations: u32,
    dt_accept_success: u32,
    dt_accept_exception: u32,
    dt_create_before_accept: u32,
    dt_create_success: u32,
    request_uri: Option<String>,
    response_code: Option<u16>,
    ignored: bool,
    finished: bool,
}

impl Transaction {
    pub fn start(name: &str, settings: TxnSettings, now: SystemTime, seed: u64) -> Transaction {
        let mut rng = SmallRng::seed_from_u64(seed);
        let priority = Priority::random(&mut rng);
        let txn_id = new_span_id(&mut rng);
        let trace_id = new_trace_id(&mut rng);
        let root_span_id = new_span_id(&mut rng);
        Transaction {
            name: name.to_string(),
            start: now,
            settings,
            threads: vec![ThreadState::new()],
            errors: Vec::new(),
            attrs: Attributes::new(),
            priority,
            sampled: None,
            txn_id,
            trace_id,
            root_span_id,
            inbound: None,
            inbound_transport: TransportType::Unknown,
            outbound_inserted: false,
            synthetics: None,
            finished_segments: Vec::new(),
            pending_slow_queries: Vec::new(),
            rng,
            order_violations: 0,
            dt_accept_success: 0,
            dt_accept_exception: 0,
            dt_create_before_accept: 0,
            dt_create_success: 0,
            request_uri: None,
            response_code: None,
            ignored: false,
            finished: false,
        }
    }

    /// Primary thread handle.
    pub const PRIMARY_THREAD: usize = 0;

    /// New cooperating tracing thread; the `NewGoroutine` analog. The
    /// returned handle is only valid for this transaction.
    pub fn create_thread(&mut self) -> usize {
        self.threads.push(ThreadState::new());
        self.threads.len() - 1
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Mark the transaction to be discarded at end.
    pub fn ignore(&mut self) {
        self.ignored = true;
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn guid(&self) -> &str {
        &self.txn_id
    }

    /// Custom attribute, subject to high security and policy filters.
    pub fn add_attribute(&mut self, key: &str, value: AttributeValue) {
        if self.settings.high_security || !self.settings.custom_parameters_allowed {
            return;
        }
        let config = self.settings.attr_config.clone();
        self.attrs.add_user(&config, key, value);
    }

    /// Agent-supplied attribute with explicit default destinations.
    pub fn add_agent_attribute(
        &mut self,
        key: &str,
        value: AttributeValue,
        defaults: crate::attributes::Destinations,
    ) {
        let config = self.settings.attr_config.clone();
        self.attrs.add_agent(&config, key, value, defaults);
    }

    pub fn set_request_uri(&mut self, uri: &str) {
        self.request_uri = Some(uri.to_string());
        let config = self.settings.attr_config.clone();
        self.attrs.add_agent(
            &config,
            "request.uri",
            AttributeValue::from(uri),
            dest::ALL & !dest::LOG,
        );
    }

    /// Observed response status. Codes outside the allow-list become errors
    /// at end.
    pub fn set_response_code(&mut self, code: u16) {
        self.response_code = Some(code);
        let config = self.settings.attr_config.clone();
        self.attrs.add_agent(
            &config,
            "httpResponseCode",
            AttributeValue::Str(code.to_string()),
            dest::ALL & !dest::LOG,
        );
    }

    pub fn notice_error(&mut self, mut e: ErrorData) {
        if self.settings.high_security || !self.settings.allow_raw_exception_messages {
            e.scrub();
        }
        self.errors.push(e);
    }

    /// Inbound synthetics header; parsed only for intrinsics, kept verbatim
    /// for forwarding.
    pub fn accept_synthetics(&mut self, header: &str) {
        if self.synthetics.is_some() {
            return;
        }
        self.synthetics = Synthetics::accept(
            header,
            &self.settings.encoding_key,
            &self.settings.trusted_accounts,
        );
    }

    // ----------------------------------------------------------------
    // Distributed trace
    // ----------------------------------------------------------------

    /// Ingest inbound trace context. Must happen before the first outbound
    /// insert on this transaction; later accepts are dropped with a counter.
    pub fn accept_distributed_trace_headers(
        &mut self,
        transport: TransportType,
        traceparent: Option<&str>,
        tracestate: Option<&str>,
        legacy: Option<&str>,
    ) {
        if !self.settings.dt_enabled || self.inbound.is_some() {
            return;
        }
        if self.outbound_inserted {
            self.dt_create_before_accept += 1;
            return;
        }
        match parse_inbound(traceparent, tracestate, legacy, &self.settings.trusted_key) {
            Ok(payload) => {
                self.trace_id = payload.trace_id.clone();
                if payload.trusted {
                    if let Some(p) = payload.priority {
                        self.priority = p;
                    }
                    if let Some(s) = payload.sampled {
                        self.sampled = Some(s);
                    }
                }
                self.inbound_transport = transport;
                self.inbound = Some(payload);
                self.dt_accept_success += 1;
            }
            Err(AcceptError::Parse) => self.dt_accept_exception += 1,
            Err(AcceptError::Missing) => {}
        }
    }

    /// Lazily resolved sampling decision; boosts priority on first yes.
    pub fn is_sampled(&mut self) -> bool {
        if let Some(s) = self.sampled {
            return s;
        }
        let decision = self
            .settings
            .sampler
            .lock()
            .map(|mut s| s.decide(Instant::now()))
            .unwrap_or(false);
        if decision {
            self.priority = self.priority.boost();
        }
        self.sampled = Some(decision);
        decision
    }

    /// Outbound headers for an external call: W3C pair, legacy header, and
    /// the synthetics header forwarded bit-exact when present.
    pub fn insert_distributed_trace_headers(&mut self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if self.settings.dt_enabled {
            let sampled = self.is_sampled();
            let span_id = self.active_span_id();
            let ctx = OutboundContext {
                trusted_key: self.settings.trusted_key.clone(),
                account: self.settings.account_id.clone(),
                app: self.settings.primary_app_id.clone(),
                trace_id: self.trace_id.clone(),
                span_id,
                txn_id: self.txn_id.clone(),
                sampled,
                priority: self.priority,
                now_millis: now_millis(),
            };
            headers.push((TRACEPARENT_HEADER.to_string(), ctx.traceparent()));
            headers.push((TRACESTATE_HEADER.to_string(), ctx.tracestate()));
            headers.push((LEGACY_HEADER.to_string(), ctx.legacy()));
            self.outbound_inserted = true;
            self.dt_create_success += 1;
        }
        if let Some(s) = &self.synthetics {
            headers.push((SYNTHETICS_HEADER.to_string(), s.header.clone()));
        }
        headers
    }

    /// Span id of the innermost open segment on the primary thread, falling
    /// back to the root span.
    fn active_span_id(&mut self) -> String {
        if !self.settings.collect_span_events {
            return self.root_span_id.clone();
        }
        let rng = &mut self.rng;
        match self.threads[Self::PRIMARY_THREAD].stack.last_mut() {
            Some(open) => open
                .span_id
                .get_or_insert_with(|| new_span_id(rng))
                .clone(),
            None => self.root_span_id.clone(),
        }
    }

    // ----------------------------------------------------------------
    // Segments
    // ----------------------------------------------------------------

    pub fn start_segment(
        &mut self,
        thread: usize,
        now: SystemTime,
    ) -> Result<SegmentToken, SegmentError> {
        if self.finished {
            return Err(SegmentError::Order);
        }
        let start_offset = self.offset(now);
        let ts = self
            .threads
            .get_mut(thread)
            .ok_or(SegmentError::Malformed)?;
        let depth = ts.depth();
        let stamp = ts.next_stamp();
        ts.stack.push(OpenSegment {
            start_offset,
            stamp,
            span_id: None,
            children_duration: Duration::ZERO,
            children_nodes: Vec::new(),
        });
        Ok(SegmentToken {
            thread,
            depth,
            stamp,
        })
    }

    pub fn end_segment(
        &mut self,
        token: SegmentToken,
        now: SystemTime,
        kind: SegmentKind,
    ) -> Result<(), SegmentError> {
        if token.stamp == 0 {
            return Err(SegmentError::Malformed);
        }
        if self.finished {
            return Err(SegmentError::Order);
        }
        let stop_offset = self.offset(now);
        let ts = self
            .threads
            .get(token.thread)
            .ok_or(SegmentError::Malformed)?;
        if token.depth >= ts.stack.len() || ts.stack[token.depth].stamp != token.stamp {
            // Already finished, or a token forged/reused across threads.
            return Err(SegmentError::Order);
        }
        // Out-of-order: close everything stacked above the token first.
        while self.threads[token.thread].depth() > token.depth + 1 {
            self.order_violations += 1;
            self.close_top(
                token.thread,
                stop_offset,
                SegmentKind::Basic {
                    name: "truncated".to_string(),
                },
                true,
                true,
            );
        }
        self.close_top(token.thread, stop_offset, kind, true, false);
        Ok(())
    }

    /// Pop the top of a thread's stack into a finished segment.
    /// `charge_parent` controls whether the duration counts against the
    /// parent's exclusive time (false for segments lost at transaction end,
    /// whose parent is still open).
    fn close_top(
        &mut self,
        thread: usize,
        stop_offset: Duration,
        kind: SegmentKind,
        charge_parent: bool,
        order_violated: bool,
    ) {
        let want_span = self.settings.collect_span_events && self.settings.dt_enabled;
        let rng = &mut self.rng;
        let ts = &mut self.threads[thread];
        let mut open = match ts.stack.pop() {
            Some(o) => o,
            None => return,
        };
        let duration = stop_offset.saturating_sub(open.start_offset);
        let exclusive = duration.saturating_sub(open.children_duration);
        ts.total_time += exclusive;

        if want_span && open.span_id.is_none() {
            open.span_id = Some(new_span_id(rng));
        }
        let parent_span_id = if want_span {
            match ts.stack.last_mut() {
                Some(parent) => Some(parent.span_id.get_or_insert_with(|| new_span_id(rng)).clone()),
                None => Some(self.root_span_id.clone()),
            }
        } else {
            None
        };

        // Trace node, unless below the segment threshold with nothing under it.
        let keep_node = duration >= self.settings.segment_threshold || !open.children_nodes.is_empty();
        if keep_node {
            let node = TraceNode {
                start_offset: open.start_offset,
                stop_offset,
                name: kind.display_name(),
                attrs: kind.agent_attrs(),
                children: open.children_nodes,
            };
            match ts.stack.last_mut() {
                Some(parent) => parent.children_nodes.push(node),
                None => ts.root_nodes.push(node),
            }
        }
        if charge_parent {
            match ts.stack.last_mut() {
                Some(parent) => parent.children_duration += duration,
                None => ts.root_children_duration += duration,
            }
        }

        // Slow query candidate.
        if self.settings.slow_queries_enabled
            && duration >= self.settings.slow_query_threshold
        {
            if let SegmentKind::Datastore {
                query: Some(query), ..
            } = &kind
            {
                self.pending_slow_queries.push(PendingSlowQuery {
                    metric_name: kind.scoped_metric(),
                    query: query.clone(),
                    duration,
                    params: kind.agent_attrs(),
                });
            }
        }

        self.finished_segments.push(SegmentEnd {
            thread,
            start_offset: open.start_offset,
            stop_offset,
            duration,
            exclusive,
            kind,
            span_id: open.span_id,
            parent_span_id,
            order_violated,
        });
    }

    fn offset(&self, now: SystemTime) -> Duration {
        now.duration_since(self.start).unwrap_or(Duration::ZERO)
    }

    // ----------------------------------------------------------------
    // End
    // ----------------------------------------------------------------

    pub fn final_name(&self) -> String {
        if self.name.contains('/') {
            return self.name.clone();
        }
        if self.settings.is_web {
            format!("WebTransaction/Rust/{}", self.name)
        } else {
            format!("OtherTransaction/Rust/{}", self.name)
        }
    }

    /// Close the transaction and resolve it into a harvest bundle. Returns
    /// `None` when the transaction was ignored.
    pub fn end(mut self, now: SystemTime) -> Option<HarvestBundle> {
        if self.finished {
            return None;
        }
        self.finished = true;

        // Response-code error, unless allow-listed.
        if let Some(code) = self.response_code {
            if code >= 400 && !self.settings.ignore_status_codes.contains(&code) {
                let mut e = ErrorData::from_response_code(now, code);
                if self.settings.high_security || !self.settings.allow_raw_exception_messages {
                    e.scrub();
                }
                self.errors.push(e);
            }
        }

        if self.ignored {
            return None;
        }

        // User attributes never leave the process under high security or
        // with custom parameters disabled, whatever landed earlier.
        if self.settings.high_security || !self.settings.custom_parameters_allowed {
            self.attrs.strip_user();
        }

        // Lost children: closed at the end time, charged to nobody.
        let end_offset = self.offset(now);
        for thread in 0..self.threads.len() {
            while !self.threads[thread].stack.is_empty() {
                self.close_top(
                    thread,
                    end_offset,
                    SegmentKind::Basic {
                        name: "truncated".to_string(),
                    },
                    false,
                    false,
                );
            }
        }

        let duration = end_offset;
        let secondary_busy: Duration = self.threads[1..]
            .iter()
            .map(|t| t.total_time)
            .fold(Duration::ZERO, |a, b| a + b);
        let total_time = duration + secondary_busy;

        let sampled = if self.settings.dt_enabled {
            self.is_sampled()
        } else {
            false
        };

        let final_name = self.final_name();
        let unexpected_errors = self.errors.iter().filter(|e| !e.expected).count();
        let expected_errors = self.errors.len() - unexpected_errors;
        let apdex_zone = if !self.settings.is_web {
            ApdexZone::None
        } else if unexpected_errors > 0 {
            ApdexZone::Frustrating
        } else {
            ApdexZone::classify(duration, self.settings.apdex_threshold)
        };

        let caller = self.caller_quadruple();
        let txn_exclusive =
            duration.saturating_sub(self.threads[Self::PRIMARY_THREAD].root_children_duration);

        let mut metrics = MetricTable::new(self.start);
        let summary = breakdown::TxnSummary {
            final_name: &final_name,
            is_web: self.settings.is_web,
            duration,
            exclusive: txn_exclusive,
            total_time,
            apdex_zone,
            apdex_threshold: self.settings.apdex_threshold,
            unexpected_errors,
            expected_errors,
            caller: &caller,
            segments: &self.finished_segments,
            order_violations: self.order_violations,
            attrs_dropped: self.attrs.dropped,
            dt_accept_success: self.dt_accept_success,
            dt_accept_exception: self.dt_accept_exception,
            dt_create_before_accept: self.dt_create_before_accept,
            dt_create_success: self.dt_create_success,
        };
        breakdown::create_txn_metrics(&summary, &mut metrics);
        let (ext_count, ext_dur, ds_count, ds_dur) =
            breakdown::segment_totals(&self.finished_segments);

        let inbound_caller = self.inbound.as_ref().map(|p| InboundCaller {
            caller_type: p.caller_type.clone(),
            account: p.account.clone(),
            app: p.app.clone(),
            transport_type: self.inbound_transport.label().to_string(),
            transport_duration: p.timestamp.map(|ts| {
                self.start
                    .duration_since(from_epoch_millis(ts))
                    .unwrap_or(Duration::ZERO)
            }),
            parent_txn_id: p.txn_id.clone(),
            parent_span_id: p.span_id.clone(),
        });

        let txn_event = if self.settings.collect_txn_events {
            Some(TxnEvent {
                final_name: final_name.clone(),
                start: self.start,
                duration,
                total_time,
                is_web: self.settings.is_web,
                apdex_zone,
                has_error: unexpected_errors > 0,
                priority: self.priority,
                sampled,
                guid: self.settings.dt_enabled.then(|| self.txn_id.clone()),
                trace_id: self.settings.dt_enabled.then(|| self.trace_id.clone()),
                inbound: inbound_caller,
                synthetics: self.synthetics.clone(),
                external_call_count: ext_count,
                external_duration: ext_dur,
                datastore_call_count: ds_count,
                datastore_duration: ds_dur,
                user_attrs: self.attrs.user_json(dest::TXN_EVENT),
                agent_attrs: self.attrs.agent_json(dest::TXN_EVENT),
            })
        } else {
            None
        };

        let mut error_events = Vec::new();
        let mut error_traces = Vec::new();
        for e in &self.errors {
            if self.settings.collect_error_events {
                error_events.push(ErrorEvent {
                    klass: e.klass.clone(),
                    msg: e.msg.clone(),
                    when: e.when,
                    txn_name: final_name.clone(),
                    duration,
                    priority: self.priority,
                    sampled,
                    guid: self.settings.dt_enabled.then(|| self.txn_id.clone()),
                    trace_id: self.settings.dt_enabled.then(|| self.trace_id.clone()),
                    user_attrs: self.attrs.user_json(dest::ERROR),
                    agent_attrs: self.attrs.agent_json(dest::ERROR),
                });
            }
            if self.settings.collect_error_traces {
                error_traces.push(ErrorTrace {
                    when: e.when,
                    txn_name: final_name.clone(),
                    msg: e.msg.clone(),
                    klass: e.klass.clone(),
                    stack: e.stack.clone(),
                    request_uri: self.request_uri.clone(),
                    user_attrs: self.attrs.user_json(dest::ERROR),
                    agent_attrs: self.attrs.agent_json(dest::ERROR),
                    guid: self.settings.dt_enabled.then(|| self.txn_id.clone()),
                });
            }
        }

        let span_events = if self.settings.dt_enabled && self.settings.collect_span_events && sampled
        {
            self.build_span_events(duration)
        } else {
            Vec::new()
        };

        let txn_trace = if self.should_save_trace(duration) {
            let mut roots: Vec<TraceNode> = Vec::new();
            for t in &mut self.threads {
                roots.append(&mut t.root_nodes);
            }
            roots.sort_by_key(|n| n.start_offset);
            Some(TxnTrace {
                start: self.start,
                duration,
                final_name: final_name.clone(),
                request_uri: self.request_uri.clone(),
                roots,
                user_attrs: self.attrs.user_json(dest::TXN_TRACE),
                agent_attrs: self.attrs.agent_json(dest::TXN_TRACE),
                guid: self.settings.dt_enabled.then(|| self.txn_id.clone()),
                synthetics_resource_id: self.synthetics.as_ref().map(|s| s.resource_id.clone()),
            })
        } else {
            None
        };

        let slow_queries = self
            .pending_slow_queries
            .drain(..)
            .map(|p| SlowQuery {
                metric_name: p.metric_name,
                query: p.query,
                txn_name: final_name.clone(),
                txn_url: self.request_uri.clone(),
                duration: p.duration,
                params: p.params,
            })
            .collect();

        Some(HarvestBundle {
            metrics,
            txn_event,
            error_events,
            error_traces,
            span_events,
            txn_trace,
            slow_queries,
            trace_priority: self
                .settings
                .dt_enabled
                .then(|| (self.trace_id.clone(), self.priority)),
        })
    }

    fn caller_quadruple(&self) -> String {
        match &self.inbound {
            Some(p) => format!(
                "{}/{}/{}/{}",
                p.caller_type,
                p.account,
                p.app,
                self.inbound_transport.label()
            ),
            None => UNKNOWN_CALLER.to_string(),
        }
    }

    fn should_save_trace(&self, duration: Duration) -> bool {
        if !self.settings.tracer_enabled {
            return false;
        }
        if self.synthetics.is_some() {
            return true;
        }
        if !self.settings.collect_traces {
            return false;
        }
        let threshold = match self.settings.tracer_threshold {
            TraceThreshold::ApdexFailing => APDEX_FAILING_MULTIPLIER * self.settings.apdex_threshold,
            TraceThreshold::Fixed(d) => d,
        };
        duration >= threshold
    }

    fn build_span_events(&mut self, duration: Duration) -> Vec<SpanEvent> {
        let mut spans = Vec::with_capacity(self.finished_segments.len() + 1);
        spans.push(SpanEvent {
            guid: self.root_span_id.clone(),
            trace_id: self.trace_id.clone(),
            txn_id: self.txn_id.clone(),
            parent_id: self
                .inbound
                .as_ref()
                .and_then(|p| p.span_id.clone()),
            name: self.final_name(),
            category: SpanCategory::Generic,
            start: self.start,
            duration,
            is_entrypoint: true,
            priority: self.priority,
            sampled: true,
            user_attrs: self.attrs.user_json(dest::SPAN),
            agent_attrs: json!({}),
        });
        for seg in &self.finished_segments {
            let guid = match &seg.span_id {
                Some(id) => id.clone(),
                None => continue,
            };
            spans.push(SpanEvent {
                guid,
                trace_id: self.trace_id.clone(),
                txn_id: self.txn_id.clone(),
                parent_id: seg.parent_span_id.clone(),
                name: seg.kind.display_name(),
                category: seg.kind.span_category(),
                start: self.start + seg.start_offset,
                duration: seg.duration,
                is_entrypoint: false,
                priority: self.priority,
                sampled: true,
                user_attrs: json!({}),
                agent_attrs: seg.kind.agent_attrs(),
            });
        }
        spans
    }
}
