//! Trace context propagation scenarios: inbound W3C headers with and
//! without a trusted tracestate entry, priority inheritance, and synthetics
//! header forwarding with event intrinsics.

use pulse_agent::dt::{TRACEPARENT_HEADER, TRACESTATE_HEADER};
use pulse_agent::synthetics::{obfuscate, SYNTHETICS_HEADER};
use pulse_agent::tracer::{Transaction, TxnSettings};
use pulse_agent::TransportType;
use std::time::{Duration, SystemTime};

const TRACEPARENT: &str = "00-12345678901234567890123456789012-9566c74d10037c4d-01";

fn t(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn settings() -> TxnSettings {
    TxnSettings {
        trusted_key: "190".into(),
        account_id: "332029".into(),
        primary_app_id: "2827902".into(),
        ..TxnSettings::default()
    }
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> &'a str {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .unwrap()
}

#[test]
fn inbound_priority_is_adopted_verbatim() {
    let mut txn = Transaction::start("inbound", settings(), t(0), 11);
    txn.accept_distributed_trace_headers(
        TransportType::Http,
        Some(TRACEPARENT),
        Some("190@nr=0-0-332029-2827902-5f474d64b9cc9b2a-7d3efb1b173fecfa-1-1.5-1569367663277"),
        None,
    );
    let headers = txn.insert_distributed_trace_headers();
    let tracestate = header(&headers, TRACESTATE_HEADER);
    let fields: Vec<&str> = tracestate.split_once('=').unwrap().1.split('-').collect();
    assert_eq!(fields[7], "1.5");
    assert!(header(&headers, TRACEPARENT_HEADER)
        .starts_with("00-12345678901234567890123456789012-"));
}

#[test]
fn missing_priority_generates_a_fresh_one() {
    let mut txn = Transaction::start("fresh", settings(), t(0), 12);
    txn.accept_distributed_trace_headers(
        TransportType::Http,
        Some(TRACEPARENT),
        None,
        None,
    );
    let headers = txn.insert_distributed_trace_headers();
    // Trace id continues the inbound trace.
    let traceparent = header(&headers, TRACEPARENT_HEADER);
    assert_eq!(
        traceparent.split('-').nth(1).unwrap(),
        "12345678901234567890123456789012"
    );
    // Priority is locally generated: parseable and in range.
    let tracestate = header(&headers, TRACESTATE_HEADER);
    let fields: Vec<&str> = tracestate.split_once('=').unwrap().1.split('-').collect();
    let priority: f32 = fields[7].parse().unwrap();
    assert!((0.0..2.0).contains(&priority));
}

#[test]
fn synthetics_header_is_forwarded_and_decorates_the_event() {
    let key = b"licence-derived-key";
    let payload = format!(
        r#"[1,444,"{}","{}","{}"]"#,
        "r".repeat(10),
        "j".repeat(10),
        "m".repeat(10)
    );
    let blob = obfuscate(payload.as_bytes(), key).unwrap();

    let mut s = settings();
    s.encoding_key = key.to_vec();
    s.trusted_accounts = vec![444];
    let mut txn = Transaction::start("monitor", s, t(0), 13);
    txn.accept_synthetics(&blob);

    // Outbound external calls must carry the header bit-exact.
    let headers = txn.insert_distributed_trace_headers();
    assert_eq!(header(&headers, SYNTHETICS_HEADER), blob);

    let bundle = txn.end(t(1)).unwrap();
    let event = bundle.txn_event.unwrap().wire();
    assert_eq!(event[0]["nr.syntheticsResourceId"], "r".repeat(10));
    assert_eq!(event[0]["nr.syntheticsJobId"], "j".repeat(10));
    assert_eq!(event[0]["nr.syntheticsMonitorId"], "m".repeat(10));
}

#[test]
fn untrusted_tracestate_key_is_ignored_but_trace_continues() {
    let mut txn = Transaction::start("untrusted", settings(), t(0), 14);
    let before = txn.priority();
    txn.accept_distributed_trace_headers(
        TransportType::Https,
        Some(TRACEPARENT),
        Some("42@nr=0-0-1-2-aaaaaaaaaaaaaaaa-bbbbbbbbbbbbbbbb-1-1.9-1"),
        None,
    );
    assert_eq!(txn.trace_id(), "12345678901234567890123456789012");
    assert_eq!(txn.priority(), before);
}
