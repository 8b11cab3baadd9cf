//! Analytic event streams
//!
//! One priority-sampled reservoir per event type. Every stream shares the
//! same payload envelope: `[run_id, sampling header, [events…]]` where the
//! header reports the reservoir size and the number of events offered during
//! the period — the collector uses the pair to extrapolate sampling rates.

pub mod custom;
pub mod error_event;
pub mod log_event;
pub mod span_event;
pub mod txn_event;

pub use custom::CustomEvent;
pub use error_event::ErrorEvent;
pub use log_event::{LogEvent, LogEventAggregator};
pub use span_event::{SpanCategory, SpanEvent};
pub use txn_event::TxnEvent;

use crate::reservoir::{Prioritized, Reservoir};
use serde_json::{json, Value};

/// Envelope shared by the analytic, custom, error and span endpoints.
/// `None` when the reservoir holds nothing (nothing to send).
pub fn events_payload<T, F>(run_id: &str, reservoir: &Reservoir<T>, wire: F) -> Option<Value>
where
    T: Prioritized,
    F: Fn(&T) -> Value,
{
    if reservoir.is_empty() {
        return None;
    }
    let events: Vec<Value> = reservoir.as_slice().iter().map(wire).collect();
    Some(json!([
        run_id,
        {
            "reservoir_size": reservoir.capacity(),
            "events_seen": reservoir.num_seen(),
        },
        events
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;

    struct Fake(f32);
    impl Prioritized for Fake {
        fn priority(&self) -> Priority {
            Priority::from_value(self.0)
        }
    }

    #[test]
    fn test_payload_envelope() {
        let mut r = Reservoir::new(2);
        r.add(Fake(0.4));
        r.add(Fake(0.6));
        r.add(Fake(0.8));
        let p = events_payload("run-1", &r, |f| json!(f.0)).unwrap();
        let arr = p.as_array().unwrap();
        assert_eq!(arr[0], "run-1");
        assert_eq!(arr[1]["reservoir_size"], 2);
        assert_eq!(arr[1]["events_seen"], 3);
        assert_eq!(arr[2].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_reservoir_yields_none() {
        let r: Reservoir<Fake> = Reservoir::new(10);
        assert!(events_payload("run-1", &r, |f| json!(f.0)).is_none());
    }

    #[test]
    fn test_zero_capacity_yields_none() {
        let mut r = Reservoir::new(0);
        r.add(Fake(0.9));
        assert!(events_payload("run-1", &r, |f| json!(f.0)).is_none());
    }
}
