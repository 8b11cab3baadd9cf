//! Attribute engine
//!
//! Attributes flow to a subset of destinations (events, traces, errors,
//! browser, spans, logs). Config include/exclude lists reshape each key's
//! destination mask: a trailing `*` matches any suffix, a longer pattern
//! beats a shorter one, and include beats exclude at equal specificity.
//!
//! High security strips user attributes entirely and redacts raw error
//! messages; the security-policies variant does the same redaction when
//! `allow_raw_exception_messages` is off.

use crate::limits::{ATTRIBUTE_KEY_LIMIT, ATTRIBUTE_VALUE_LIMIT, MAX_USER_ATTRIBUTES};
use rustc_hash::FxHashMap;
use serde_json::Value;

/// Destination bitset.
pub type Destinations = u8;

pub mod dest {
    use super::Destinations;

    pub const NONE: Destinations = 0;
    pub const TXN_EVENT: Destinations = 1 << 0;
    pub const TXN_TRACE: Destinations = 1 << 1;
    pub const ERROR: Destinations = 1 << 2;
    pub const BROWSER: Destinations = 1 << 3;
    pub const SPAN: Destinations = 1 << 4;
    pub const LOG: Destinations = 1 << 5;
    pub const ALL: Destinations = TXN_EVENT | TXN_TRACE | ERROR | BROWSER | SPAN | LOG;

    /// Where user attributes land unless config says otherwise. Logs opt in
    /// via include rules.
    pub const USER_DEFAULT: Destinations = TXN_EVENT | TXN_TRACE | ERROR | BROWSER | SPAN;
}

/// Replacement used wherever a raw error message may not leave the process.
pub const REDACTED_MESSAGE: &str = "message removed by high security setting";

/// Typed attribute value. Strings are capped at 255 bytes on a char
/// boundary before storage.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl AttributeValue {
    pub fn json(&self) -> Value {
        match self {
            AttributeValue::Str(s) => Value::String(s.clone()),
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Int(i) => (*i).into(),
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Str(truncate_value(s))
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Str(truncate_value(&s))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

/// Cap a string value at 255 bytes without splitting a character.
pub fn truncate_value(s: &str) -> String {
    if s.len() <= ATTRIBUTE_VALUE_LIMIT {
        return s.to_string();
    }
    let mut end = ATTRIBUTE_VALUE_LIMIT;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[derive(Debug, Clone)]
struct Modifier {
    prefix: String,
    wildcard: bool,
    include: Destinations,
    exclude: Destinations,
}

impl Modifier {
    fn matches(&self, key: &str) -> bool {
        if self.wildcard {
            key.starts_with(self.prefix.as_str())
        } else {
            key == self.prefix
        }
    }
}

/// Compiled include/exclude rules. Built once per Application.
#[derive(Debug, Clone, Default)]
pub struct AttributeConfig {
    /// Sorted least-specific first so later (more specific) rules override.
    modifiers: Vec<Modifier>,
    /// Destinations disabled wholesale (e.g. attribute collection off).
    disabled: Destinations,
}

impl AttributeConfig {
    pub fn builder() -> AttributeConfigBuilder {
        AttributeConfigBuilder {
            by_pattern: FxHashMap::default(),
            disabled: dest::NONE,
        }
    }

    /// Effective mask for a key, starting from its default destinations.
    pub fn apply(&self, key: &str, defaults: Destinations) -> Destinations {
        let mut mask = defaults;
        for m in &self.modifiers {
            if m.matches(key) {
                // Exclude first so an include at equal specificity wins.
                mask &= !m.exclude;
                mask |= m.include;
            }
        }
        mask & !self.disabled
    }
}

pub struct AttributeConfigBuilder {
    by_pattern: FxHashMap<String, (Destinations, Destinations)>,
    disabled: Destinations,
}

impl AttributeConfigBuilder {
    /// Register include patterns for a destination set.
    pub fn include(mut self, patterns: &[String], dests: Destinations) -> Self {
        for p in patterns {
            self.by_pattern.entry(p.clone()).or_default().0 |= dests;
        }
        self
    }

    /// Register exclude patterns for a destination set.
    pub fn exclude(mut self, patterns: &[String], dests: Destinations) -> Self {
        for p in patterns {
            self.by_pattern.entry(p.clone()).or_default().1 |= dests;
        }
        self
    }

    /// Turn a destination off entirely, overriding any include.
    pub fn disable(mut self, dests: Destinations) -> Self {
        self.disabled |= dests;
        self
    }

    pub fn build(self) -> AttributeConfig {
        let mut modifiers: Vec<Modifier> = self
            .by_pattern
            .into_iter()
            .map(|(pattern, (include, exclude))| {
                let wildcard = pattern.ends_with('*');
                let prefix = if wildcard {
                    pattern[..pattern.len() - 1].to_string()
                } else {
                    pattern
                };
                Modifier {
                    prefix,
                    wildcard,
                    include,
                    exclude,
                }
            })
            .collect();
        // Ascending specificity: wildcards before exact matches, shorter
        // prefixes before longer ones.
        modifiers.sort_by(|a, b| {
            (!a.wildcard, a.prefix.len(), a.prefix.as_str()).cmp(&(
                !b.wildcard,
                b.prefix.len(),
                b.prefix.as_str(),
            ))
        });
        AttributeConfig {
            modifiers,
            disabled: self.disabled,
        }
    }
}

/// Per-transaction (or per-event) attribute container: user attributes
/// filtered through config, agent attributes with fixed defaults.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    user: FxHashMap<String, (AttributeValue, Destinations)>,
    agent: FxHashMap<String, (AttributeValue, Destinations)>,
    /// Keys refused for length or count, surfaced as a supportability count.
    pub dropped: u32,
}

impl Attributes {
    pub fn new() -> Self {
        Attributes::default()
    }

    /// Add a user attribute. Over-long keys and overflow past the per-entity
    /// cap are dropped (counted, not errors).
    pub fn add_user(&mut self, config: &AttributeConfig, key: &str, value: AttributeValue) {
        if key.len() > ATTRIBUTE_KEY_LIMIT {
            self.dropped += 1;
            return;
        }
        if self.user.len() >= MAX_USER_ATTRIBUTES && !self.user.contains_key(key) {
            self.dropped += 1;
            return;
        }
        let mask = config.apply(key, dest::USER_DEFAULT);
        self.user.insert(key.to_string(), (value, mask));
    }

    /// Add an agent attribute with its own default destinations.
    pub fn add_agent(
        &mut self,
        config: &AttributeConfig,
        key: &str,
        value: AttributeValue,
        defaults: Destinations,
    ) {
        let mask = config.apply(key, defaults);
        self.agent.insert(key.to_string(), (value, mask));
    }

    /// Drop every user attribute (high security, or custom parameters
    /// disabled by policy).
    pub fn strip_user(&mut self) {
        self.user.clear();
    }

    pub fn user_count(&self) -> usize {
        self.user.len()
    }

    /// User attributes visible at a destination, as a JSON object.
    pub fn user_json(&self, d: Destinations) -> Value {
        collect(&self.user, d)
    }

    /// Agent attributes visible at a destination, as a JSON object.
    pub fn agent_json(&self, d: Destinations) -> Value {
        collect(&self.agent, d)
    }
}

fn collect(map: &FxHashMap<String, (AttributeValue, Destinations)>, d: Destinations) -> Value {
    let mut obj = serde_json::Map::new();
    for (k, (v, mask)) in map {
        if mask & d != 0 {
            obj.insert(k.clone(), v.json());
        }
    }
    Value::Object(obj)
}
