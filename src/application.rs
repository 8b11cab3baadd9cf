//! Application facade
//!
//! The public entry point. An [`Application`] owns one harvest thread and
//! one collector connection; user threads talk to it through nil-safe
//! handles and a bounded drop-oldest submission channel, so no recording
//! call ever blocks on I/O.
//!
//! Lifecycle: construct (config validated) -> harvest thread preconnects /
//! connects with backoff -> harvest loop ticks, drains the channel, flushes
//! ready payloads -> `shutdown` drains and runs one final flush.

use crate::attributes::{dest, AttributeConfig, AttributeValue};
use crate::collector::{
    connect_backoff, connect_payload, method, preconnect_host, preconnect_payload,
    CollectorTransport, HttpTransport, SubmitOutcome, SubmitRequest,
};
use crate::config::{AgentConfig, SecurityPolicies};
use crate::connect_reply::ConnectReply;
use crate::dt::{DtSampler, TransportType};
use crate::error_data::ErrorData;
use crate::errors::ConfigError;
use crate::events::log_event::LogData;
use crate::events::{events_payload, CustomEvent, TxnEvent};
use crate::harvest::{
    harvest_types, Harvest, HarvestContext, HarvestLimits, HarvestPart, HarvestTimer, PayloadEntry,
};
use crate::limits::{HARVEST_TICK, SUBMISSION_CHANNEL_CAPACITY};
use crate::reservoir::Reservoir;
use crate::tracer::{SegmentKind, SegmentToken, Transaction, TxnSettings};
use crossbeam_queue::ArrayQueue;
use once_cell::sync::OnceCell;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Source location pinned to a transaction for code-level metrics.
#[derive(Debug, Clone)]
pub struct CodeLocation {
    pub function: String,
    pub file_path: String,
    pub line_number: u32,
}

/// One-shot cache for an expensive code-location lookup. Reuse across
/// transactions from a single thread; it is not synchronized beyond the
/// first fill.
#[derive(Debug, Default)]
pub struct CachedCodeLocation {
    cell: OnceCell<Option<CodeLocation>>,
}

impl CachedCodeLocation {
    pub fn new() -> Self {
        CachedCodeLocation::default()
    }

    pub fn get(&self, fill: impl FnOnce() -> Option<CodeLocation>) -> Option<CodeLocation> {
        self.cell.get_or_init(fill).clone()
    }
}

/// Per-transaction start options. Applying an option is a pure
/// transformation of this struct; unrecognized combinations are inert.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub location_override: Option<CodeLocation>,
    pub suppress_code_level_metrics: bool,
    pub demand_code_level_metrics: bool,
    pub ignored_path_prefixes: Vec<String>,
    pub ignored_identifier_prefixes: Vec<String>,
}

impl StartOptions {
    /// The location to attach, after suppression and ignore-prefix rules.
    pub fn resolve(&self) -> Option<CodeLocation> {
        if self.suppress_code_level_metrics {
            return None;
        }
        let loc = self.location_override.as_ref()?;
        if self
            .ignored_identifier_prefixes
            .iter()
            .any(|p| loc.function.starts_with(p.as_str()))
        {
            return None;
        }
        if self
            .ignored_path_prefixes
            .iter()
            .any(|p| loc.file_path.starts_with(p.as_str()))
        {
            return None;
        }
        Some(loc.clone())
    }
}

enum AgentEvent {
    TxnFinished(Box<crate::tracer::HarvestBundle>),
    Custom(CustomEvent),
    Metric { name: String, value: f64 },
    Log(LogData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Connecting,
    Connected,
    Stopped,
}

struct AppInner {
    config: AgentConfig,
    attr_config: Arc<AttributeConfig>,
    channel: ArrayQueue<AgentEvent>,
    dropped: AtomicU64,
    shutdown: AtomicBool,
    state: Mutex<ConnState>,
    cond: Condvar,
    /// Settings template for new transactions; rebuilt on every connect.
    txn_settings: Mutex<TxnSettings>,
    policies: Mutex<SecurityPolicies>,
    sampler: Arc<Mutex<DtSampler>>,
    event_rng: Mutex<SmallRng>,
    seed_counter: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AppInner {
    fn submit(&self, event: AgentEvent) {
        if self.channel.force_push(event).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn set_state(&self, s: ConnState) {
        let mut guard = self.state.lock().unwrap();
        *guard = s;
        self.cond.notify_all();
    }

    fn next_seed(&self) -> u64 {
        self.seed_counter.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handle to a running agent. Cheap to clone; an empty handle (disabled
/// agent) is valid and records nothing.
#[derive(Clone, Default)]
pub struct Application {
    inner: Option<Arc<AppInner>>,
}

impl Application {
    /// Construct with the production HTTP transport.
    pub fn new(config: AgentConfig) -> Result<Application, ConfigError> {
        Application::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Construct with an injected transport (tests, custom pipelines).
    pub fn with_transport(
        config: AgentConfig,
        transport: Arc<dyn CollectorTransport>,
    ) -> Result<Application, ConfigError> {
        config.validate()?;
        if !config.enabled {
            info!("agent disabled by configuration");
            return Ok(Application { inner: None });
        }
        let attr_config = Arc::new(config.attribute_config());
        let sampler = Arc::new(Mutex::new(DtSampler::new(false, false, 10, Instant::now())));
        let base_seed = rand::random::<u64>();
        let txn_settings = build_txn_settings(
            &config,
            None,
            &SecurityPolicies::default(),
            attr_config.clone(),
            sampler.clone(),
        );
        let inner = Arc::new(AppInner {
            attr_config,
            channel: ArrayQueue::new(SUBMISSION_CHANNEL_CAPACITY),
            dropped: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            state: Mutex::new(ConnState::Connecting),
            cond: Condvar::new(),
            txn_settings: Mutex::new(txn_settings),
            policies: Mutex::new(SecurityPolicies::default()),
            sampler,
            event_rng: Mutex::new(SmallRng::seed_from_u64(base_seed)),
            seed_counter: AtomicU64::new(base_seed),
            handle: Mutex::new(None),
            config,
        });
        let thread_inner = inner.clone();
        let handle = thread::Builder::new()
            .name("pulse-agent-harvest".to_string())
            .spawn(move || harvest_loop(thread_inner, transport))
            .map_err(|e| ConfigError::Logging(e.to_string()))?;
        *inner.handle.lock().unwrap() = Some(handle);
        Ok(Application { inner: Some(inner) })
    }

    /// Begin observing one unit of work.
    pub fn start_transaction(&self, name: &str) -> TransactionHandle {
        self.start_transaction_with_options(name, &StartOptions::default())
    }

    pub fn start_transaction_with_options(
        &self,
        name: &str,
        options: &StartOptions,
    ) -> TransactionHandle {
        let inner = match &self.inner {
            Some(i) => i,
            None => return TransactionHandle::default(),
        };
        let settings = inner.txn_settings.lock().unwrap().clone();
        let mut txn = Transaction::start(name, settings, SystemTime::now(), inner.next_seed());
        if let Some(loc) = options.resolve() {
            txn_add_code_location(&mut txn, &loc);
        }
        TransactionHandle {
            txn: Some(txn),
            app: Some(inner.clone()),
        }
    }

    /// Record a user-defined event, subject to high security and policy.
    pub fn record_custom_event(&self, event_type: &str, attrs: Vec<(String, AttributeValue)>) {
        let inner = match &self.inner {
            Some(i) => i,
            None => return,
        };
        if !inner.config.custom_events.enabled || inner.config.high_security {
            return;
        }
        if !inner.policies.lock().unwrap().custom_events {
            return;
        }
        let priority = {
            let mut rng = inner.event_rng.lock().unwrap();
            crate::priority::Priority::random(&mut *rng)
        };
        match CustomEvent::new(
            event_type,
            attrs,
            &inner.attr_config,
            SystemTime::now(),
            priority,
        ) {
            Ok(event) => inner.submit(AgentEvent::Custom(event)),
            Err(e) => debug!(error = %e, "custom event rejected"),
        }
    }

    pub fn record_custom_metric(&self, name: &str, value: f64) {
        let inner = match &self.inner {
            Some(i) => i,
            None => return,
        };
        if !value.is_finite() {
            debug!(name, "custom metric value must be finite");
            return;
        }
        inner.submit(AgentEvent::Metric {
            name: name.to_string(),
            value,
        });
    }

    /// Forward one application log record.
    pub fn record_log(&self, data: LogData) {
        let inner = match &self.inner {
            Some(i) => i,
            None => return,
        };
        if !inner.config.application_logging.enabled {
            return;
        }
        match data.validate() {
            Ok(valid) => inner.submit(AgentEvent::Log(valid)),
            Err(e) => debug!(error = %e, "log record rejected"),
        }
    }

    /// Block until the collector accepted a connect, or the timeout.
    pub fn wait_for_connection(&self, timeout: Duration) -> bool {
        let inner = match &self.inner {
            Some(i) => i,
            None => return false,
        };
        let deadline = Instant::now() + timeout;
        let mut state = inner.state.lock().unwrap();
        loop {
            match *state {
                ConnState::Connected => return true,
                ConnState::Stopped => return false,
                ConnState::Connecting => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = inner.cond.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }

    /// Drain, flush once, stop the harvest thread. Data still unflushed at
    /// the timeout is discarded.
    pub fn shutdown(&self, timeout: Duration) {
        let inner = match &self.inner {
            Some(i) => i,
            None => return,
        };
        inner.shutdown.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;
        {
            let mut state = inner.state.lock().unwrap();
            while *state != ConnState::Stopped {
                let now = Instant::now();
                if now >= deadline {
                    warn!("shutdown timeout elapsed, discarding unflushed data");
                    return;
                }
                let (guard, _) = inner.cond.wait_timeout(state, deadline - now).unwrap();
                state = guard;
            }
        }
        if let Some(handle) = inner.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn txn_add_code_location(txn: &mut Transaction, loc: &CodeLocation) {
    // code-level attributes ride on spans and traces only
    let dests = dest::SPAN | dest::TXN_TRACE;
    txn.add_agent_attribute(
        "code.function",
        AttributeValue::from(loc.function.as_str()),
        dests,
    );
    txn.add_agent_attribute(
        "code.filepath",
        AttributeValue::from(loc.file_path.as_str()),
        dests,
    );
    txn.add_agent_attribute("code.lineno", AttributeValue::Int(loc.line_number as i64), dests);
}

/// Nil-safe transaction handle; all methods on an empty handle are no-ops
/// returning zero values.
#[derive(Default)]
pub struct TransactionHandle {
    txn: Option<Transaction>,
    app: Option<Arc<AppInner>>,
}

impl TransactionHandle {
    pub fn is_recording(&self) -> bool {
        self.txn.is_some()
    }

    pub fn set_name(&mut self, name: &str) {
        if let Some(t) = &mut self.txn {
            t.set_name(name);
        }
    }

    pub fn ignore(&mut self) {
        if let Some(t) = &mut self.txn {
            t.ignore();
        }
    }

    pub fn set_web_request(&mut self, uri: &str) {
        if let Some(t) = &mut self.txn {
            t.set_request_uri(uri);
        }
    }

    pub fn set_response_code(&mut self, code: u16) {
        if let Some(t) = &mut self.txn {
            t.set_response_code(code);
        }
    }

    pub fn add_attribute(&mut self, key: &str, value: AttributeValue) {
        if let Some(t) = &mut self.txn {
            t.add_attribute(key, value);
        }
    }

    pub fn notice_error(&mut self, e: ErrorData) {
        if let Some(t) = &mut self.txn {
            t.notice_error(e);
        }
    }

    /// New cooperating tracing thread handle (`NewGoroutine` analog).
    pub fn create_thread(&mut self) -> usize {
        self.txn.as_mut().map(|t| t.create_thread()).unwrap_or(0)
    }

    pub fn start_segment(&mut self, thread: usize, now: SystemTime) -> Option<SegmentToken> {
        let t = self.txn.as_mut()?;
        match t.start_segment(thread, now) {
            Ok(token) => Some(token),
            Err(e) => {
                debug!(error = %e, "segment start rejected");
                None
            }
        }
    }

    pub fn end_segment(&mut self, token: SegmentToken, now: SystemTime, kind: SegmentKind) {
        if let Some(t) = &mut self.txn {
            if let Err(e) = t.end_segment(token, now, kind) {
                debug!(error = %e, "segment discarded");
            }
        }
    }

    pub fn accept_distributed_trace_headers(
        &mut self,
        transport: TransportType,
        traceparent: Option<&str>,
        tracestate: Option<&str>,
        legacy: Option<&str>,
    ) {
        if let Some(t) = &mut self.txn {
            t.accept_distributed_trace_headers(transport, traceparent, tracestate, legacy);
        }
    }

    pub fn accept_synthetics(&mut self, header: &str) {
        if let Some(t) = &mut self.txn {
            t.accept_synthetics(header);
        }
    }

    pub fn insert_distributed_trace_headers(&mut self) -> Vec<(String, String)> {
        self.txn
            .as_mut()
            .map(|t| t.insert_distributed_trace_headers())
            .unwrap_or_default()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.txn.as_ref().map(|t| t.trace_id())
    }

    /// Close and hand the transaction to the harvest thread.
    pub fn end(mut self, now: SystemTime) {
        let txn = match self.txn.take() {
            Some(t) => t,
            None => return,
        };
        if let Some(bundle) = txn.end(now) {
            if let Some(app) = &self.app {
                app.submit(AgentEvent::TxnFinished(Box::new(bundle)));
            }
        }
    }
}

fn build_txn_settings(
    config: &AgentConfig,
    reply: Option<&ConnectReply>,
    policies: &SecurityPolicies,
    attr_config: Arc<AttributeConfig>,
    sampler: Arc<Mutex<DtSampler>>,
) -> TxnSettings {
    let default_reply = ConnectReply::default();
    let reply = reply.unwrap_or(&default_reply);
    TxnSettings {
        is_web: true,
        apdex_threshold: reply.apdex_threshold(config.apdex_threshold),
        tracer_enabled: config.transaction_tracer.enabled,
        tracer_threshold: config.transaction_tracer.threshold,
        segment_threshold: config.transaction_tracer.segment_threshold,
        collect_traces: reply.collect_traces,
        collect_txn_events: config.transaction_events.enabled && reply.collect_analytics_events,
        collect_error_events: config.error_collector.capture_events && reply.collect_error_events,
        collect_error_traces: config.error_collector.enabled && reply.collect_errors,
        collect_span_events: config.span_events.enabled
            && config.distributed_tracer.enabled
            && reply.collect_span_events,
        slow_queries_enabled: config.transaction_tracer.slow_queries_enabled
            && policies.record_sql,
        slow_query_threshold: config.transaction_tracer.slow_query_threshold,
        dt_enabled: config.distributed_tracer.enabled,
        trusted_key: if reply.trusted_account_key.is_empty() {
            reply.account_id.clone()
        } else {
            reply.trusted_account_key.clone()
        },
        account_id: reply.account_id.clone(),
        primary_app_id: reply.primary_application_id.clone(),
        high_security: config.high_security,
        allow_raw_exception_messages: !config.high_security
            && policies.allow_raw_exception_messages,
        custom_parameters_allowed: !config.high_security && policies.custom_parameters,
        ignore_status_codes: config.error_collector.ignore_status_codes.clone(),
        encoding_key: reply.encoding_key.as_bytes().to_vec(),
        trusted_accounts: reply.trusted_account_ids.clone(),
        attr_config,
        sampler,
    }
}

// --------------------------------------------------------------------
// Harvest loop
// --------------------------------------------------------------------

enum LoopSignal {
    Continue,
    Restart,
    Fatal,
}

fn harvest_loop(inner: Arc<AppInner>, transport: Arc<dyn CollectorTransport>) {
    let license = inner.config.license.clone();
    let hostname = crate::environment::hostname(&inner.config);
    let pid = std::process::id();
    let mut attempt: i32 = 0;
    let mut rng = SmallRng::seed_from_u64(inner.seed_counter.load(Ordering::Relaxed) ^ 0x9e3779b9);

    'connect: loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            inner.set_state(ConnState::Stopped);
            return;
        }

        // ---------------- Preconnect + connect ----------------
        let host = preconnect_host(&license, inner.config.host.as_deref());
        let pre_payload = preconnect_payload(&inner.config);
        let pre = transport.submit(
            &host,
            &license,
            &SubmitRequest {
                method: method::PRECONNECT,
                run_id: None,
                payload: &pre_payload,
            },
        );
        let redirect_host = match pre {
            SubmitOutcome::Accepted(body) => body
                .as_ref()
                .and_then(|v| v.get("redirect_host"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| host.clone()),
            SubmitOutcome::Fatal => {
                error!("collector rejected preconnect permanently; agent disabled");
                inner.set_state(ConnState::Stopped);
                return;
            }
            _ => {
                backoff_sleep(&inner, &mut attempt);
                continue 'connect;
            }
        };

        let conn_payload = connect_payload(&inner.config, &hostname, pid);
        let conn = transport.submit(
            &redirect_host,
            &license,
            &SubmitRequest {
                method: method::CONNECT,
                run_id: None,
                payload: &conn_payload,
            },
        );
        let reply: ConnectReply = match conn {
            SubmitOutcome::Accepted(Some(body)) => match serde_json::from_value(body) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "connect reply unparseable");
                    backoff_sleep(&inner, &mut attempt);
                    continue 'connect;
                }
            },
            SubmitOutcome::Fatal => {
                error!("invalid license or rejected host; agent disabled");
                inner.set_state(ConnState::Stopped);
                return;
            }
            _ => {
                backoff_sleep(&inner, &mut attempt);
                continue 'connect;
            }
        };
        attempt = 0;
        info!(run_id = %reply.agent_run_id, host = %redirect_host, "connected");

        // ---------------- Apply reply ----------------
        let rules = crate::metric_rules::MetricRules::from_rules(reply.metric_name_rules.clone());
        let mut limits = HarvestLimits::from_config(&inner.config);
        limits.apply_reply(&inner.config, &reply);
        {
            let mut sampler = inner.sampler.lock().unwrap();
            *sampler = DtSampler::new(
                reply.sample_everything,
                reply.sample_nothing,
                reply.sampler_target(),
                Instant::now(),
            );
        }
        let policies = inner.policies.lock().unwrap().clone();
        {
            let mut settings = inner.txn_settings.lock().unwrap();
            *settings = build_txn_settings(
                &inner.config,
                Some(&reply),
                &policies,
                inner.attr_config.clone(),
                inner.sampler.clone(),
            );
        }
        let ctx = HarvestContext {
            run_id: reply.agent_run_id.clone(),
            entity_guid: reply.entity_guid.clone(),
            hostname: hostname.clone(),
        };

        let now = SystemTime::now();
        let mut harvest = Harvest::new(now, limits.clone());
        let mut timer = HarvestTimer::new(now, limits.event_period);
        inner.set_state(ConnState::Connected);

        // ---------------- Harvest ticks ----------------
        loop {
            if inner.shutdown.load(Ordering::SeqCst) {
                drain_channel(&inner, &mut harvest, &mut rng);
                harvest.record_dropped_events(inner.dropped.swap(0, Ordering::Relaxed));
                harvest.metrics.apply_rules(&rules);
                let entries = harvest.ready(harvest_types::ALL, SystemTime::now(), &ctx);
                let _ = submit_entries(
                    &*transport,
                    &redirect_host,
                    &license,
                    &ctx,
                    &mut harvest,
                    entries,
                );
                inner.set_state(ConnState::Stopped);
                return;
            }
            thread::sleep(HARVEST_TICK);
            drain_channel(&inner, &mut harvest, &mut rng);
            let now = SystemTime::now();
            let types = timer.ready(now);
            if types == 0 {
                continue;
            }
            if types & harvest_types::METRICS_TRACES != 0 {
                harvest.record_dropped_events(inner.dropped.swap(0, Ordering::Relaxed));
                harvest.metrics.apply_rules(&rules);
            }
            let entries = harvest.ready(types, now, &ctx);
            match submit_entries(
                &*transport,
                &redirect_host,
                &license,
                &ctx,
                &mut harvest,
                entries,
            ) {
                LoopSignal::Continue => {}
                LoopSignal::Restart => {
                    info!("collector requested restart");
                    inner.set_state(ConnState::Connecting);
                    continue 'connect;
                }
                LoopSignal::Fatal => {
                    error!("collector rejected run permanently; agent disabled");
                    inner.set_state(ConnState::Stopped);
                    return;
                }
            }
        }
    }
}

fn backoff_sleep(inner: &AppInner, attempt: &mut i32) {
    let delay = connect_backoff(*attempt);
    *attempt = attempt.saturating_add(1);
    debug!(delay_secs = delay.as_secs(), "connect backoff");
    // Sleep in small slices so shutdown stays responsive.
    let deadline = Instant::now() + delay;
    while Instant::now() < deadline {
        if inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        thread::sleep(HARVEST_TICK.min(remaining));
    }
}

fn drain_channel(inner: &AppInner, harvest: &mut Harvest, rng: &mut SmallRng) {
    while let Some(event) = inner.channel.pop() {
        match event {
            AgentEvent::TxnFinished(bundle) => harvest.apply_bundle(*bundle),
            AgentEvent::Custom(event) => harvest.add_custom_event(event),
            AgentEvent::Metric { name, value } => harvest.record_custom_metric(&name, value),
            AgentEvent::Log(data) => harvest.record_log(data, rng),
        }
    }
}

fn submit_entries(
    transport: &dyn CollectorTransport,
    host: &str,
    license: &str,
    ctx: &HarvestContext,
    harvest: &mut Harvest,
    entries: Vec<PayloadEntry>,
) -> LoopSignal {
    for entry in entries {
        let outcome = transport.submit(
            host,
            license,
            &SubmitRequest {
                method: entry.method,
                run_id: Some(&ctx.run_id),
                payload: &entry.payload,
            },
        );
        match outcome {
            SubmitOutcome::Accepted(_) => {}
            SubmitOutcome::Retry => harvest.merge_failed_part(entry.part),
            SubmitOutcome::TooLarge => match entry.part {
                HarvestPart::TxnEvents(reservoir) => {
                    submit_split_txn_events(transport, host, license, ctx, harvest, reservoir);
                }
                other => {
                    warn!(method = entry.method, "oversized payload dropped");
                    drop(other);
                }
            },
            SubmitOutcome::Restart => return LoopSignal::Restart,
            SubmitOutcome::Fatal => return LoopSignal::Fatal,
            SubmitOutcome::Drop => {
                warn!(method = entry.method, "payload rejected and dropped");
            }
        }
    }
    LoopSignal::Continue
}

/// A transaction-event payload the collector called too large: split the
/// reservoir and send both halves; a half that is still too large is
/// dropped (a single event cannot be split further).
fn submit_split_txn_events(
    transport: &dyn CollectorTransport,
    host: &str,
    license: &str,
    ctx: &HarvestContext,
    harvest: &mut Harvest,
    reservoir: Reservoir<TxnEvent>,
) {
    let (left, right) = reservoir.split();
    for half in [left, right] {
        let payload = match events_payload(&ctx.run_id, &half, TxnEvent::wire) {
            Some(p) => p,
            None => continue,
        };
        let outcome = transport.submit(
            host,
            license,
            &SubmitRequest {
                method: method::TXN_EVENTS,
                run_id: Some(&ctx.run_id),
                payload: &payload,
            },
        );
        match outcome {
            SubmitOutcome::Accepted(_) => {}
            SubmitOutcome::Retry => harvest.merge_failed_part(HarvestPart::TxnEvents(half)),
            _ => {
                warn!("split event payload still rejected; dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    /// Transport that accepts everything and records what it saw.
    struct MockTransport {
        log: Mutex<Vec<(String, Value)>>,
        reply: Value,
    }

    impl MockTransport {
        fn new() -> Self {
            MockTransport {
                log: Mutex::new(Vec::new()),
                reply: json!({
                    "agent_run_id": "run-1",
                    "entity_guid": "GUID",
                    "trusted_account_key": "190",
                    "account_id": "332029",
                    "primary_application_id": "2827902",
                    "sample_everything": true,
                }),
            }
        }

        fn methods(&self) -> Vec<String> {
            self.log.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
        }
    }

    impl CollectorTransport for MockTransport {
        fn submit(&self, _host: &str, _license: &str, req: &SubmitRequest<'_>) -> SubmitOutcome {
            self.log
                .lock()
                .unwrap()
                .push((req.method.to_string(), req.payload.clone()));
            match req.method {
                method::PRECONNECT => {
                    SubmitOutcome::Accepted(Some(json!({"redirect_host": "collector.test"})))
                }
                method::CONNECT => SubmitOutcome::Accepted(Some(self.reply.clone())),
                _ => SubmitOutcome::Accepted(None),
            }
        }
    }

    fn license() -> &'static str {
        "0123456789012345678901234567890123456789"
    }

    #[test]
    fn test_connect_and_final_flush() {
        let transport = Arc::new(MockTransport::new());
        let app =
            Application::with_transport(AgentConfig::new("App", license()), transport.clone())
                .unwrap();
        assert!(app.wait_for_connection(Duration::from_secs(10)));

        let mut txn = app.start_transaction("hello");
        let now = SystemTime::now();
        let seg = txn.start_segment(0, now).unwrap();
        txn.end_segment(seg, now, SegmentKind::Basic { name: "work".into() });
        txn.end(now);
        app.record_custom_metric("cache_hits", 2.0);

        app.shutdown(Duration::from_secs(10));
        let methods = transport.methods();
        assert!(methods.contains(&method::PRECONNECT.to_string()));
        assert!(methods.contains(&method::CONNECT.to_string()));
        assert!(methods.contains(&method::METRIC_DATA.to_string()));
        assert!(methods.contains(&method::TXN_EVENTS.to_string()));
    }

    #[test]
    fn test_disabled_agent_records_nothing() {
        let mut config = AgentConfig::new("App", license());
        config.enabled = false;
        let app = Application::new(config).unwrap();
        assert!(!app.wait_for_connection(Duration::from_millis(10)));
        let mut txn = app.start_transaction("noop");
        assert!(!txn.is_recording());
        assert!(txn.start_segment(0, SystemTime::now()).is_none());
        assert!(txn.insert_distributed_trace_headers().is_empty());
        txn.end(SystemTime::now());
        app.record_custom_metric("x", 1.0);
        app.shutdown(Duration::from_millis(10));
    }

    #[test]
    fn test_empty_handle_is_safe() {
        let mut handle = TransactionHandle::default();
        assert!(!handle.is_recording());
        handle.set_name("renamed");
        handle.notice_error(ErrorData::new(SystemTime::now(), "m", "k"));
        assert_eq!(handle.create_thread(), 0);
        assert!(handle.trace_id().is_none());
        handle.end(SystemTime::now());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AgentConfig::new("App", "short");
        assert!(Application::new(config).is_err());
    }

    #[test]
    fn test_start_options_resolution() {
        let loc = CodeLocation {
            function: "myapp::handlers::index".into(),
            file_path: "/srv/app/src/handlers.rs".into(),
            line_number: 42,
        };
        let mut options = StartOptions {
            location_override: Some(loc),
            ..Default::default()
        };
        assert!(options.resolve().is_some());
        options.ignored_identifier_prefixes = vec!["myapp::handlers".into()];
        assert!(options.resolve().is_none());
        options.ignored_identifier_prefixes.clear();
        options.suppress_code_level_metrics = true;
        assert!(options.resolve().is_none());
    }

    #[test]
    fn test_cached_code_location_fills_once() {
        let cache = CachedCodeLocation::new();
        let mut calls = 0;
        let first = cache.get(|| {
            calls += 1;
            Some(CodeLocation {
                function: "f".into(),
                file_path: "p".into(),
                line_number: 1,
            })
        });
        assert!(first.is_some());
        let second = cache.get(|| {
            calls += 1;
            None
        });
        assert!(second.is_some());
        assert_eq!(calls, 1);
    }
}
