//! Distributed trace context
//!
//! Inbound: W3C `traceparent` plus the trusted-account `@nr` entry of
//! `tracestate`; a legacy base64 `newrelic` JSON header is accepted as a
//! fallback. Outbound: both W3C headers plus (optionally) the legacy one.
//!
//! Priority inheritance: a trusted tracestate entry that carries a priority
//! wins verbatim; otherwise the transaction keeps its locally generated
//! priority. The sampled flag likewise flows through when supplied and is
//! otherwise decided lazily by the [`DtSampler`] on first query.

use crate::priority::Priority;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
pub const LEGACY_HEADER: &str = "newrelic";

/// 16-byte trace id as 32 lowercase hex chars.
pub fn new_trace_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    hex::encode(rng.gen::<[u8; 16]>())
}

/// 8-byte span id as 16 lowercase hex chars.
pub fn new_span_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    hex::encode(rng.gen::<[u8; 8]>())
}

/// Transport over which a payload traveled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Http,
    Https,
    Kafka,
    Jms,
    IronMq,
    Amqp,
    Queue,
    Other,
    Unknown,
}

impl TransportType {
    pub fn label(self) -> &'static str {
        match self {
            TransportType::Http => "HTTP",
            TransportType::Https => "HTTPS",
            TransportType::Kafka => "Kafka",
            TransportType::Jms => "JMS",
            TransportType::IronMq => "IronMQ",
            TransportType::Amqp => "AMQP",
            TransportType::Queue => "Queue",
            TransportType::Other => "Other",
            TransportType::Unknown => "Unknown",
        }
    }
}

/// Parsed inbound context, transport-independent.
#[derive(Debug, Clone)]
pub struct InboundPayload {
    /// "App", "Browser" or "Mobile".
    pub caller_type: String,
    pub account: String,
    pub app: String,
    pub trace_id: String,
    /// Parent span guid (absent when the caller sent no span).
    pub span_id: Option<String>,
    /// Parent transaction guid.
    pub txn_id: Option<String>,
    pub sampled: Option<bool>,
    pub priority: Option<Priority>,
    /// Send time, epoch millis; drives parent.transportDuration.
    pub timestamp: Option<i64>,
    /// Whether the payload came from a trusted tracestate entry (priority
    /// and sampled are honored only then).
    pub trusted: bool,
}

/// Denormalized caller fields carried on finished-transaction artifacts.
#[derive(Debug, Clone)]
pub struct InboundCaller {
    pub caller_type: String,
    pub account: String,
    pub app: String,
    pub transport_type: String,
    pub transport_duration: Option<Duration>,
    pub parent_txn_id: Option<String>,
    pub parent_span_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptError {
    /// Header present but unparseable.
    Parse,
    /// No recognized trace headers at all.
    Missing,
}

/// Parse a W3C `traceparent` value: `00-<32 hex>-<16 hex>-<2 hex>`.
pub fn parse_traceparent(value: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = value.trim().split('-').collect();
    if parts.len() != 4 {
        return None;
    }
    let (version, trace_id, parent_id, flags) = (parts[0], parts[1], parts[2], parts[3]);
    if version.len() != 2 || version == "ff" || !is_lower_hex(version) {
        return None;
    }
    if trace_id.len() != 32 || !is_lower_hex(trace_id) || trace_id.bytes().all(|b| b == b'0') {
        return None;
    }
    if parent_id.len() != 16 || !is_lower_hex(parent_id) || parent_id.bytes().all(|b| b == b'0') {
        return None;
    }
    if flags.len() != 2 || !is_lower_hex(flags) {
        return None;
    }
    Some((trace_id.to_string(), parent_id.to_string()))
}

fn is_lower_hex(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Extract and parse the `<trusted_key>@nr` entry from `tracestate`:
/// `0-0-<acct>-<app>-<span>-<txn>-<sampled>-<priority>-<millis>`.
pub fn parse_tracestate(value: &str, trusted_key: &str) -> Option<InboundPayload> {
    let wanted = format!("{trusted_key}@nr");
    let entry = value
        .split(',')
        .filter_map(|e| e.trim().split_once('='))
        .find(|(k, _)| *k == wanted)?
        .1;
    let fields: Vec<&str> = entry.split('-').collect();
    if fields.len() < 9 {
        return None;
    }
    if fields[0] != "0" {
        return None; // unknown tracestate version
    }
    let caller_type = match fields[1] {
        "0" => "App",
        "1" => "Browser",
        "2" => "Mobile",
        _ => return None,
    };
    let sampled = match fields[6] {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    };
    let priority = if fields[7].is_empty() {
        None
    } else {
        fields[7].parse::<f32>().ok().map(Priority::from_value)
    };
    let timestamp = fields[8].parse::<i64>().ok();
    Some(InboundPayload {
        caller_type: caller_type.to_string(),
        account: fields[2].to_string(),
        app: fields[3].to_string(),
        trace_id: String::new(), // filled from traceparent by the caller
        span_id: none_if_empty(fields[4]),
        txn_id: none_if_empty(fields[5]),
        sampled,
        priority,
        timestamp,
        trusted: true,
    })
}

fn none_if_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct LegacyEnvelope {
    v: [u32; 2],
    d: LegacyData,
}

#[derive(Debug, Deserialize)]
struct LegacyData {
    ty: String,
    ac: String,
    ap: String,
    #[serde(default)]
    id: Option<String>,
    tr: String,
    #[serde(default)]
    tx: Option<String>,
    #[serde(default)]
    pr: Option<f32>,
    #[serde(default)]
    sa: Option<bool>,
    #[serde(default)]
    ti: Option<i64>,
    #[serde(default)]
    tk: Option<String>,
}

/// Parse the legacy `newrelic` header (base64 or plain JSON). The payload
/// is trusted when its `tk` (or `ac`) matches the reply's trusted key.
pub fn parse_legacy(value: &str, trusted_key: &str) -> Result<InboundPayload, AcceptError> {
    let raw = match BASE64.decode(value.trim()) {
        Ok(bytes) => String::from_utf8(bytes).map_err(|_| AcceptError::Parse)?,
        Err(_) => value.trim().to_string(),
    };
    let envelope: LegacyEnvelope = serde_json::from_str(&raw).map_err(|_| AcceptError::Parse)?;
    if envelope.v[0] > 0 {
        return Err(AcceptError::Parse); // future major version
    }
    let d = envelope.d;
    let trusted = d.tk.as_deref().unwrap_or(&d.ac) == trusted_key;
    Ok(InboundPayload {
        caller_type: d.ty,
        account: d.ac,
        app: d.ap,
        trace_id: d.tr,
        span_id: d.id,
        txn_id: d.tx,
        sampled: if trusted { d.sa } else { None },
        priority: if trusted {
            d.pr.map(Priority::from_value)
        } else {
            None
        },
        timestamp: d.ti,
        trusted,
    })
}

/// Parse whatever inbound headers are present, W3C first.
pub fn parse_inbound(
    traceparent: Option<&str>,
    tracestate: Option<&str>,
    legacy: Option<&str>,
    trusted_key: &str,
) -> Result<InboundPayload, AcceptError> {
    if let Some(tp) = traceparent {
        let (trace_id, parent_span) = parse_traceparent(tp).ok_or(AcceptError::Parse)?;
        let mut payload = tracestate
            .and_then(|ts| parse_tracestate(ts, trusted_key))
            .unwrap_or(InboundPayload {
                caller_type: "App".to_string(),
                account: String::new(),
                app: String::new(),
                trace_id: String::new(),
                span_id: None,
                txn_id: None,
                sampled: None,
                priority: None,
                timestamp: None,
                trusted: false,
            });
        payload.trace_id = trace_id;
        // traceparent's parent id wins: it is the span that made the call.
        payload.span_id = Some(parent_span);
        return Ok(payload);
    }
    if let Some(raw) = legacy {
        return parse_legacy(raw, trusted_key);
    }
    Err(AcceptError::Missing)
}

/// Fields needed to emit outbound headers.
#[derive(Debug, Clone)]
pub struct OutboundContext {
    pub trusted_key: String,
    pub account: String,
    pub app: String,
    pub trace_id: String,
    pub span_id: String,
    pub txn_id: String,
    pub sampled: bool,
    pub priority: Priority,
    pub now_millis: i64,
}

impl OutboundContext {
    pub fn traceparent(&self) -> String {
        let flags = if self.sampled { "01" } else { "00" };
        format!("00-{}-{}-{}", self.trace_id, self.span_id, flags)
    }

    pub fn tracestate(&self) -> String {
        format!(
            "{}@nr=0-0-{}-{}-{}-{}-{}-{}-{}",
            self.trusted_key,
            self.account,
            self.app,
            self.span_id,
            self.txn_id,
            if self.sampled { "1" } else { "0" },
            self.priority.traced(),
            self.now_millis,
        )
    }

    /// Legacy `newrelic` header value (base64 JSON).
    pub fn legacy(&self) -> String {
        let payload = json!({
            "v": [0, 1],
            "d": {
                "ty": "App",
                "ac": self.account,
                "ap": self.app,
                "id": self.span_id,
                "tr": self.trace_id,
                "tx": self.txn_id,
                "pr": self.priority.value(),
                "sa": self.sampled,
                "ti": self.now_millis,
                "tk": self.trusted_key,
            }
        });
        BASE64.encode(payload.to_string())
    }
}

/// Lazy sampled decision. The reply can force everything or nothing;
/// otherwise the first `target` transactions of each period are sampled.
#[derive(Debug)]
pub struct DtSampler {
    sample_everything: bool,
    sample_nothing: bool,
    target: u64,
    period: Duration,
    period_start: Instant,
    sampled_this_period: u64,
}

impl DtSampler {
    pub fn new(sample_everything: bool, sample_nothing: bool, target: u64, now: Instant) -> Self {
        DtSampler {
            sample_everything,
            sample_nothing,
            target,
            period: Duration::from_secs(60),
            period_start: now,
            sampled_this_period: 0,
        }
    }

    pub fn decide(&mut self, now: Instant) -> bool {
        if self.sample_nothing {
            return false;
        }
        if self.sample_everything {
            return true;
        }
        if now.duration_since(self.period_start) >= self.period {
            self.period_start = now;
            self.sampled_this_period = 0;
        }
        if self.sampled_this_period < self.target {
            self.sampled_this_period += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_id_shapes() {
        let mut rng = SmallRng::seed_from_u64(1);
        let t = new_trace_id(&mut rng);
        let s = new_span_id(&mut rng);
        assert_eq!(t.len(), 32);
        assert_eq!(s.len(), 16);
        assert!(is_lower_hex(&t));
        assert!(is_lower_hex(&s));
    }

    #[test]
    fn test_parse_traceparent() {
        let (trace, span) =
            parse_traceparent("00-12345678901234567890123456789012-9566c74d10037c4d-01").unwrap();
        assert_eq!(trace, "12345678901234567890123456789012");
        assert_eq!(span, "9566c74d10037c4d");
    }

    #[test]
    fn test_parse_traceparent_rejects() {
        assert!(parse_traceparent("junk").is_none());
        assert!(parse_traceparent("ff-12345678901234567890123456789012-9566c74d10037c4d-01")
            .is_none());
        assert!(parse_traceparent("00-00000000000000000000000000000000-9566c74d10037c4d-01")
            .is_none());
        assert!(parse_traceparent("00-12345678901234567890123456789012-0000000000000000-01")
            .is_none());
        assert!(
            parse_traceparent("00-1234567890123456789012345678901Z-9566c74d10037c4d-01").is_none()
        );
    }

    #[test]
    fn test_parse_tracestate_trusted_entry() {
        let ts = "190@nr=0-0-332029-2827902-5f474d64b9cc9b2a-7d3efb1b173fecfa-1-1.5-1569367663277,other=stuff";
        let p = parse_tracestate(ts, "190").unwrap();
        assert_eq!(p.caller_type, "App");
        assert_eq!(p.account, "332029");
        assert_eq!(p.app, "2827902");
        assert_eq!(p.span_id.as_deref(), Some("5f474d64b9cc9b2a"));
        assert_eq!(p.txn_id.as_deref(), Some("7d3efb1b173fecfa"));
        assert_eq!(p.sampled, Some(true));
        assert_eq!(p.priority.unwrap().value(), 1.5);
        assert_eq!(p.timestamp, Some(1569367663277));
        assert!(p.trusted);
    }

    #[test]
    fn test_parse_tracestate_missing_priority() {
        let ts = "190@nr=0-0-332029-2827902-5f474d64b9cc9b2a-7d3efb1b173fecfa---1569367663277";
        let p = parse_tracestate(ts, "190").unwrap();
        assert_eq!(p.sampled, None);
        assert!(p.priority.is_none());
    }

    #[test]
    fn test_parse_tracestate_wrong_key() {
        let ts = "190@nr=0-0-1-2-a-b-1-0.5-1";
        assert!(parse_tracestate(ts, "42").is_none());
    }

    #[test]
    fn test_inbound_w3c_without_tracestate() {
        let p = parse_inbound(
            Some("00-12345678901234567890123456789012-9566c74d10037c4d-01"),
            None,
            None,
            "190",
        )
        .unwrap();
        assert_eq!(p.trace_id, "12345678901234567890123456789012");
        assert_eq!(p.span_id.as_deref(), Some("9566c74d10037c4d"));
        assert!(!p.trusted);
        assert!(p.priority.is_none());
    }

    #[test]
    fn test_legacy_roundtrip() {
        let ctx = OutboundContext {
            trusted_key: "190".into(),
            account: "123".into(),
            app: "456".into(),
            trace_id: "12345678901234567890123456789012".into(),
            span_id: "9566c74d10037c4d".into(),
            txn_id: "7d3efb1b173fecfa".into(),
            sampled: true,
            priority: Priority::from_value(1.5),
            now_millis: 1569367663277,
        };
        let p = parse_legacy(&ctx.legacy(), "190").unwrap();
        assert_eq!(p.trace_id, "12345678901234567890123456789012");
        assert_eq!(p.account, "123");
        assert_eq!(p.sampled, Some(true));
        assert_eq!(p.priority.unwrap().value(), 1.5);
        assert!(p.trusted);
    }

    #[test]
    fn test_legacy_untrusted_drops_sampling() {
        let ctx = OutboundContext {
            trusted_key: "190".into(),
            account: "123".into(),
            app: "456".into(),
            trace_id: "12345678901234567890123456789012".into(),
            span_id: "9566c74d10037c4d".into(),
            txn_id: "7d3efb1b173fecfa".into(),
            sampled: true,
            priority: Priority::from_value(1.5),
            now_millis: 0,
        };
        let p = parse_legacy(&ctx.legacy(), "other").unwrap();
        assert!(!p.trusted);
        assert!(p.sampled.is_none());
        assert!(p.priority.is_none());
    }

    #[test]
    fn test_outbound_headers() {
        let ctx = OutboundContext {
            trusted_key: "190".into(),
            account: "332029".into(),
            app: "2827902".into(),
            trace_id: "12345678901234567890123456789012".into(),
            span_id: "5f474d64b9cc9b2a".into(),
            txn_id: "7d3efb1b173fecfa".into(),
            sampled: true,
            priority: Priority::from_value(1.5),
            now_millis: 1569367663277,
        };
        assert_eq!(
            ctx.traceparent(),
            "00-12345678901234567890123456789012-5f474d64b9cc9b2a-01"
        );
        assert_eq!(
            ctx.tracestate(),
            "190@nr=0-0-332029-2827902-5f474d64b9cc9b2a-7d3efb1b173fecfa-1-1.5-1569367663277"
        );
    }

    #[test]
    fn test_sampler_flags() {
        let now = Instant::now();
        let mut all = DtSampler::new(true, false, 10, now);
        assert!(all.decide(now));
        let mut none = DtSampler::new(false, true, 10, now);
        assert!(!none.decide(now));
    }

    #[test]
    fn test_sampler_target_per_period() {
        let now = Instant::now();
        let mut s = DtSampler::new(false, false, 2, now);
        assert!(s.decide(now));
        assert!(s.decide(now));
        assert!(!s.decide(now));
        let later = now + Duration::from_secs(61);
        assert!(s.decide(later));
    }
}
