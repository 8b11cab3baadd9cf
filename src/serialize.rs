//! Payload serialization helpers
//!
//! All harvest payloads are built as `serde_json::Value` trees and encoded
//! with `serde_json`, which gives the determinism the collector protocol
//! needs for free: object keys serialize in sorted order (the default
//! `serde_json::Map` is a `BTreeMap`), floats use shortest round-trip
//! encoding, and integers never take exponent form — which is why every
//! nanosecond-granularity duration on the wire is an integer, never a
//! float.
//!
//! Wall-clock timestamps cross the wire as integer epoch milliseconds
//! (seconds for the metric window); durations as fractional milliseconds
//! or seconds depending on the endpoint.

use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};

/// Epoch seconds, truncated. Metric windows use second granularity.
pub fn to_epoch_seconds(t: SystemTime) -> i64 {
    DateTime::<Utc>::from(t).timestamp()
}

/// Epoch milliseconds. Event and trace timestamps use milli granularity.
pub fn to_epoch_millis(t: SystemTime) -> i64 {
    DateTime::<Utc>::from(t).timestamp_millis()
}

/// Wall clock now as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Duration as fractional milliseconds (trace segment offsets, event
/// duration attributes).
pub fn duration_to_millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Duration as fractional seconds (metric slots, apdex thresholds).
pub fn duration_to_seconds(d: Duration) -> f64 {
    d.as_secs_f64()
}

/// Millis-since-epoch back to `SystemTime`; inverse of [`to_epoch_millis`]
/// for inbound trace context timestamps.
pub fn from_epoch_millis(millis: i64) -> SystemTime {
    if millis >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_millis(millis as u64)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
    }
}
