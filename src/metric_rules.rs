//! Server metric rename rules
//!
//! The connect reply may carry `metric_name_rules`: ordered substring
//! rules that rename or drop unscoped metric names. Rules are evaluated in
//! `eval_order`; the first rule whose match expression is a substring of
//! the metric name wins.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MetricRule {
    #[serde(alias = "match")]
    pub match_expression: String,
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub eval_order: i32,
}

impl MetricRule {
    fn matches(&self, name: &str) -> bool {
        !self.match_expression.is_empty() && name.contains(self.match_expression.as_str())
    }
}

/// Rules sorted by evaluation order, ready to apply.
#[derive(Debug, Clone, Default)]
pub struct MetricRules {
    rules: Vec<MetricRule>,
}

impl MetricRules {
    pub fn from_rules(mut rules: Vec<MetricRule>) -> Self {
        rules.sort_by_key(|r| r.eval_order);
        MetricRules { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Apply the first matching rule. `None` means the name is ignored;
    /// otherwise the (possibly renamed) name is returned. The replacement
    /// substitutes the first occurrence of the matched substring.
    pub fn apply(&self, name: &str) -> Option<String> {
        for rule in &self.rules {
            if rule.matches(name) {
                if rule.ignore {
                    return None;
                }
                return Some(name.replacen(&rule.match_expression, &rule.replacement, 1));
            }
        }
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(m: &str, r: &str, ignore: bool, order: i32) -> MetricRule {
        MetricRule {
            match_expression: m.into(),
            replacement: r.into(),
            ignore,
            eval_order: order,
        }
    }

    #[test]
    fn test_first_match_wins_by_eval_order() {
        let rules = MetricRules::from_rules(vec![
            rule("foo", "SECOND", false, 2),
            rule("foo", "FIRST", false, 1),
        ]);
        assert_eq!(rules.apply("a/foo/b").unwrap(), "a/FIRST/b");
    }

    #[test]
    fn test_substring_replacement_is_single() {
        let rules = MetricRules::from_rules(vec![rule("x", "y", false, 0)]);
        assert_eq!(rules.apply("x/x").unwrap(), "y/x");
    }

    #[test]
    fn test_ignore() {
        let rules = MetricRules::from_rules(vec![rule("secret", "", true, 0)]);
        assert_eq!(rules.apply("my/secret/metric"), None);
        assert_eq!(rules.apply("public").unwrap(), "public");
    }

    #[test]
    fn test_no_rules_passthrough() {
        let rules = MetricRules::default();
        assert_eq!(rules.apply("anything").unwrap(), "anything");
    }

    #[test]
    fn test_deserialize_reply_shape() {
        let parsed: Vec<MetricRule> = serde_json::from_str(
            r#"[{"match_expression":"rename_me","replacement":"been_renamed","eval_order":0}]"#,
        )
        .unwrap();
        let rules = MetricRules::from_rules(parsed);
        assert_eq!(rules.apply("rename_me").unwrap(), "been_renamed");
    }
}
