//! Hard limits and default capacities
//!
//! Every bounded buffer in the agent takes its cap from here. Server-side
//! overrides (connect reply) may lower or raise the event reservoir sizes,
//! but never the metric table or artifact caps.

use std::time::Duration;

/// Default transaction event reservoir capacity per harvest period.
pub const MAX_TXN_EVENTS: usize = 10_000;

/// Default custom event reservoir capacity per harvest period.
pub const MAX_CUSTOM_EVENTS: usize = 10_000;

/// Default error event reservoir capacity per harvest period.
pub const MAX_ERROR_EVENTS: usize = 100;

/// Default span event reservoir capacity per harvest period.
pub const MAX_SPAN_EVENTS: usize = 2_000;

/// Default log event reservoir capacity per harvest period.
pub const MAX_LOG_EVENTS: usize = 10_000;

/// Metric table capacity; past this, unforced metrics fold into an
/// overflow counter.
pub const MAX_METRICS: usize = 2_000;

/// Slow query aggregator keeps the top-K queries by duration per harvest.
pub const MAX_SLOW_QUERIES: usize = 10;

/// Error trace buffer cap per harvest.
pub const MAX_ERROR_TRACES: usize = 20;

/// A reservoir that failed to harvest this many consecutive times stops
/// merging back (memory bound during collector outage).
pub const FAILED_HARVESTS_LIMIT: u32 = 10;

/// Attribute key byte cap; longer keys are dropped.
pub const ATTRIBUTE_KEY_LIMIT: usize = 255;

/// Attribute string value byte cap; longer values are truncated.
pub const ATTRIBUTE_VALUE_LIMIT: usize = 255;

/// Custom event type name byte cap.
pub const CUSTOM_EVENT_TYPE_LIMIT: usize = 255;

/// User attributes per transaction or event.
pub const MAX_USER_ATTRIBUTES: usize = 64;

/// Log message byte cap (inclusive).
pub const MAX_LOG_MESSAGE_BYTES: usize = 32_768;

/// App name list cap (`;`-separated in config).
pub const MAX_APP_NAMES: usize = 3;

/// License keys are exactly this many bytes.
pub const LICENSE_LENGTH: usize = 40;

/// Metrics, traces, slow queries and errors flush on this fixed cadence.
pub const FIXED_HARVEST_PERIOD: Duration = Duration::from_secs(60);

/// Event streams flush on this cadence unless the connect reply overrides it.
pub const DEFAULT_EVENT_PERIOD: Duration = Duration::from_secs(60);

/// Submission channel capacity; the channel drops oldest under pressure.
pub const SUBMISSION_CHANNEL_CAPACITY: usize = 10_000;

/// Harvest loop wakeup granularity.
pub const HARVEST_TICK: Duration = Duration::from_secs(1);

/// Connect retry schedule in seconds, clamped at the last entry.
pub const CONNECT_BACKOFF_SECS: [u64; 6] = [15, 15, 30, 60, 120, 300];

/// Collector wire protocol version.
pub const PROTOCOL_VERSION: u32 = 17;

/// Language tag reported in the connect payload.
pub const AGENT_LANGUAGE: &str = "rust";

/// Agent version reported in the connect payload.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Apdex threshold, overridable per app by the connect reply.
pub const DEFAULT_APDEX_THRESHOLD: Duration = Duration::from_millis(500);

/// Default transaction trace threshold multiplier: a transaction is trace
/// eligible when its duration exceeds four Apdex thresholds.
pub const APDEX_FAILING_MULTIPLIER: u32 = 4;
