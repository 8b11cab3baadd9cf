//! Metric name constants
//!
//! Rollup and supportability names used by the breakdown synthesis and the
//! harvest engine. Scoped entries are built from these prefixes plus the
//! final transaction name.

// Transaction rollups
pub const WEB_ROLLUP: &str = "WebTransaction";
pub const WEB_PREFIX: &str = "WebTransaction/";
pub const WEB_TOTAL_TIME: &str = "WebTransactionTotalTime";
pub const WEB_TOTAL_TIME_PREFIX: &str = "WebTransactionTotalTime/";
pub const OTHER_ROLLUP: &str = "OtherTransaction/all";
pub const OTHER_PREFIX: &str = "OtherTransaction/";
pub const OTHER_TOTAL_TIME: &str = "OtherTransactionTotalTime";
pub const OTHER_TOTAL_TIME_PREFIX: &str = "OtherTransactionTotalTime/";

// Apdex
pub const APDEX_ROLLUP: &str = "Apdex";
pub const APDEX_PREFIX: &str = "Apdex/";

// Errors
pub const ERRORS_ALL: &str = "Errors/all";
pub const ERRORS_ALL_WEB: &str = "Errors/allWeb";
pub const ERRORS_ALL_OTHER: &str = "Errors/allOther";
pub const ERRORS_PREFIX: &str = "Errors/";
pub const ERRORS_EXPECTED_ALL: &str = "ErrorsExpected/all";

// Distributed trace caller rollups
pub const DURATION_BY_CALLER_PREFIX: &str = "DurationByCaller/";
pub const ERRORS_BY_CALLER_PREFIX: &str = "ErrorsByCaller/";

// External segments
pub const EXTERNAL_ALL: &str = "External/all";
pub const EXTERNAL_ALL_WEB: &str = "External/allWeb";
pub const EXTERNAL_ALL_OTHER: &str = "External/allOther";
pub const EXTERNAL_PREFIX: &str = "External/";

// Datastore segments
pub const DATASTORE_ALL: &str = "Datastore/all";
pub const DATASTORE_ALL_WEB: &str = "Datastore/allWeb";
pub const DATASTORE_ALL_OTHER: &str = "Datastore/allOther";
pub const DATASTORE_PREFIX: &str = "Datastore/";
pub const DATASTORE_OPERATION_PREFIX: &str = "Datastore/operation/";
pub const DATASTORE_STATEMENT_PREFIX: &str = "Datastore/statement/";

// Message segments
pub const MESSAGE_ALL: &str = "MessageBroker/all";
pub const MESSAGE_ALL_WEB: &str = "MessageBroker/allWeb";
pub const MESSAGE_ALL_OTHER: &str = "MessageBroker/allOther";
pub const MESSAGE_PREFIX: &str = "MessageBroker/";

// Custom metrics recorded through the facade
pub const CUSTOM_PREFIX: &str = "Custom/";

// Log metrics, accumulated even when log event collection is off
pub const LOGGING_LINES: &str = "Logging/lines";
pub const LOGGING_LINES_PREFIX: &str = "Logging/lines/";

// Agent self-diagnostics
pub const SUPPORT_METRICS_DROPPED: &str = "Supportability/MetricsDropped";
pub const SUPPORT_EVENTS_DROPPED: &str = "Supportability/EventsDropped";
pub const SUPPORT_SEGMENT_OUT_OF_ORDER: &str = "Supportability/Segments/OutOfOrder";
pub const SUPPORT_ATTRIBUTES_DROPPED: &str = "Supportability/AgentAttributes/Dropped";
pub const SUPPORT_DT_ACCEPT_SUCCESS: &str = "Supportability/DistributedTrace/AcceptPayload/Success";
pub const SUPPORT_DT_ACCEPT_EXCEPTION: &str =
    "Supportability/DistributedTrace/AcceptPayload/Exception";
pub const SUPPORT_DT_CREATE_BEFORE_ACCEPT: &str =
    "Supportability/DistributedTrace/AcceptPayload/Ignored/CreateBeforeAccept";
pub const SUPPORT_DT_CREATE_SUCCESS: &str = "Supportability/DistributedTrace/CreatePayload/Success";
pub const SUPPORT_TXN_EVENTS_SEEN: &str = "Supportability/AnalyticsEvents/TotalEventsSeen";
pub const SUPPORT_TXN_EVENTS_SENT: &str = "Supportability/AnalyticsEvents/TotalEventsSent";
pub const SUPPORT_CUSTOM_EVENTS_SEEN: &str = "Supportability/Events/Customer/Seen";
pub const SUPPORT_CUSTOM_EVENTS_SENT: &str = "Supportability/Events/Customer/Sent";
pub const SUPPORT_ERROR_EVENTS_SEEN: &str = "Supportability/Events/TransactionError/Seen";
pub const SUPPORT_ERROR_EVENTS_SENT: &str = "Supportability/Events/TransactionError/Sent";
pub const SUPPORT_SPAN_EVENTS_SEEN: &str = "Supportability/SpanEvent/TotalEventsSeen";
pub const SUPPORT_SPAN_EVENTS_SENT: &str = "Supportability/SpanEvent/TotalEventsSent";
pub const SUPPORT_LOG_EVENTS_SEEN: &str = "Supportability/Logging/Forwarding/Seen";
pub const SUPPORT_LOG_EVENTS_SENT: &str = "Supportability/Logging/Forwarding/Sent";

/// Caller quadruple used when a transaction had no inbound trace context.
pub const UNKNOWN_CALLER: &str = "Unknown/Unknown/Unknown/Unknown";
