//! Error observations
//!
//! An [`ErrorData`] is a single observed failure: user-noticed, derived from
//! an HTTP response code outside the allow-list, or a recaptured panic. It
//! attaches to its transaction at end and fans out into an error event, the
//! error rollup metrics, and (capacity permitting) an error trace.

use crate::attributes::REDACTED_MESSAGE;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct ErrorData {
    pub when: SystemTime,
    pub msg: String,
    pub klass: String,
    pub stack: Option<String>,
    /// Expected errors count toward ErrorsExpected/all instead of Errors/all
    /// and do not flip the apdex zone.
    pub expected: bool,
}

impl ErrorData {
    pub fn new(when: SystemTime, msg: impl Into<String>, klass: impl Into<String>) -> Self {
        ErrorData {
            when,
            msg: msg.into(),
            klass: klass.into(),
            stack: None,
            expected: false,
        }
    }

    /// Error derived from an HTTP response status.
    pub fn from_response_code(when: SystemTime, code: u16) -> Self {
        ErrorData {
            when,
            msg: status_text(code).to_string(),
            klass: code.to_string(),
            stack: None,
            expected: false,
        }
    }

    /// Error derived from a recaptured panic; instrumentation re-panics
    /// after recording.
    pub fn from_panic(when: SystemTime, msg: impl Into<String>) -> Self {
        ErrorData {
            when,
            msg: msg.into(),
            klass: "panic".to_string(),
            stack: None,
            expected: false,
        }
    }

    /// Replace the raw message when high security or policy forbids it.
    pub fn scrub(&mut self) {
        self.msg = REDACTED_MESSAGE.to_string();
    }
}

fn status_text(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Response Code Error",
    }
}
