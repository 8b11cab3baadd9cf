//! Custom events
//!
//! User-defined events recorded through the facade. The event type must be
//! alphanumeric/colon/underscore/space and at most 255 bytes; attributes go
//! through the standard filter and caps.

use crate::attributes::{dest, AttributeConfig, Attributes, AttributeValue};
use crate::errors::RecordError;
use crate::limits::CUSTOM_EVENT_TYPE_LIMIT;
use crate::priority::Priority;
use crate::reservoir::Prioritized;
use crate::serialize::to_epoch_millis;
use serde_json::{json, Value};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct CustomEvent {
    pub event_type: String,
    pub timestamp: SystemTime,
    pub priority: Priority,
    pub attrs: Value,
}

impl Prioritized for CustomEvent {
    fn priority(&self) -> Priority {
        self.priority
    }
}

fn valid_event_type(t: &str) -> bool {
    !t.is_empty()
        && t.len() <= CUSTOM_EVENT_TYPE_LIMIT
        && t.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == ' ')
}

impl CustomEvent {
    /// Validate and build. Attribute filtering is applied at creation so the
    /// event is immutable afterwards.
    pub fn new(
        event_type: &str,
        attributes: Vec<(String, AttributeValue)>,
        config: &AttributeConfig,
        timestamp: SystemTime,
        priority: Priority,
    ) -> Result<CustomEvent, RecordError> {
        if !valid_event_type(event_type) {
            return Err(RecordError::EventTypeInvalid(event_type.to_string()));
        }
        let mut attrs = Attributes::new();
        for (k, v) in attributes {
            attrs.add_user(config, &k, v);
        }
        Ok(CustomEvent {
            event_type: event_type.to_string(),
            timestamp,
            priority,
            attrs: attrs.user_json(dest::TXN_EVENT),
        })
    }

    pub fn wire(&self) -> Value {
        json!([
            {
                "type": self.event_type,
                "timestamp": to_epoch_millis(self.timestamp),
            },
            self.attrs,
            {}
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(event_type: &str) -> Result<CustomEvent, RecordError> {
        CustomEvent::new(
            event_type,
            vec![("color".into(), AttributeValue::from("red"))],
            &AttributeConfig::default(),
            SystemTime::UNIX_EPOCH,
            Priority::from_value(0.5),
        )
    }

    #[test]
    fn test_valid_types() {
        assert!(make("MyEvent").is_ok());
        assert!(make("My Event:2_x").is_ok());
    }

    #[test]
    fn test_invalid_types() {
        assert!(make("").is_err());
        assert!(make("bad-dash").is_err());
        assert!(make("has.dot").is_err());
        assert!(make(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_wire_shape() {
        let w = make("MyEvent").unwrap().wire();
        let arr = w.as_array().unwrap();
        assert_eq!(arr[0]["type"], "MyEvent");
        assert_eq!(arr[0]["timestamp"], 0);
        assert_eq!(arr[1]["color"], "red");
        assert_eq!(arr[2], json!({}));
    }
}
