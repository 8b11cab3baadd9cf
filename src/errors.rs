//! Agent error taxonomy
//!
//! Only `Application` construction surfaces errors to the caller. Everything
//! else recovers locally: bad segments are discarded with a supportability
//! counter, overfull channels drop, and collector failures feed the backoff
//! and merge-back machinery instead of propagating.

use thiserror::Error;

/// Configuration rejected at `Application` construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("license length is {0}, expected 40")]
    LicenseLength(usize),

    #[error("application requires an app name")]
    AppNameMissing,

    #[error("at most 3 app names allowed, got {0}")]
    AppNameCount(usize),

    #[error("security policies token conflicts with high security mode")]
    HighSecurityPolicyConflict,

    #[error("log destination error: {0}")]
    Logging(String),
}

/// Segment token rejected by the tracer. Non-fatal: the segment is
/// discarded and a supportability metric is recorded.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum SegmentError {
    /// Token does not correspond to the current top of its thread's stack
    /// (double finish, stale stamp, or wrong thread).
    #[error("segment finished out of order")]
    Order,

    /// Token is structurally invalid (depth underflow or zero stamp).
    #[error("malformed segment token")]
    Malformed,
}

/// Validation failures for user-supplied records. Recovered locally with a
/// log line and a supportability counter; exposed for unit tests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("log record is empty")]
    LogEmpty,

    #[error("log message is {0} bytes, cap is 32768")]
    LogTooLarge(usize),

    #[error("custom event type {0:?} is not alphanumeric/colon/underscore/space")]
    EventTypeInvalid(String),

    #[error("custom events disabled by configuration or policy")]
    EventsDisabled,

    #[error("custom metric value must be finite")]
    MetricNotFinite,
}
