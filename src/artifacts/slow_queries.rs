//! Slow query aggregation
//!
//! Datastore segments above the slow-query threshold land here, keyed by
//! (metric name, normalized query). The aggregator keeps the top-K keys by
//! worst-case duration per harvest; each key tracks a call count, total and
//! min/max durations, and the single slowest observation's context.

use crate::limits::MAX_SLOW_QUERIES;
use crate::serialize::duration_to_millis;
use rustc_hash::{FxHashMap, FxHasher};
use serde_json::{json, Value};
use std::hash::{Hash, Hasher};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SlowQuery {
    /// e.g. `Datastore/statement/MySQL/users/SELECT`
    pub metric_name: String,
    /// Normalized (obfuscated) query text.
    pub query: String,
    pub txn_name: String,
    pub txn_url: Option<String>,
    pub duration: Duration,
    /// Instance info and query params, already attribute-filtered.
    pub params: Value,
}

#[derive(Debug, Clone)]
struct SlowQueryStats {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    slowest: SlowQuery,
}

impl SlowQueryStats {
    fn observe(&mut self, q: SlowQuery) {
        self.count += 1;
        self.total += q.duration;
        self.min = self.min.min(q.duration);
        if q.duration > self.max {
            self.max = q.duration;
            self.slowest = q;
        }
    }

    fn merge(&mut self, other: SlowQueryStats) {
        self.count += other.count;
        self.total += other.total;
        self.min = self.min.min(other.min);
        if other.max > self.max {
            self.max = other.max;
            self.slowest = other.slowest;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlowQueryKey {
    metric_name: String,
    query: String,
}

/// Top-K slow queries for one harvest period.
#[derive(Debug, Clone, Default)]
pub struct SlowQueryAggregator {
    queries: FxHashMap<SlowQueryKey, SlowQueryStats>,
}

impl SlowQueryAggregator {
    pub fn new() -> Self {
        SlowQueryAggregator::default()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn observe(&mut self, q: SlowQuery) {
        let key = SlowQueryKey {
            metric_name: q.metric_name.clone(),
            query: q.query.clone(),
        };
        if let Some(stats) = self.queries.get_mut(&key) {
            stats.observe(q);
            return;
        }
        if self.queries.len() >= MAX_SLOW_QUERIES {
            // Evict the least-slow key iff the newcomer is slower.
            let evict = self
                .queries
                .iter()
                .min_by_key(|(_, s)| s.max)
                .map(|(k, s)| (k.clone(), s.max));
            match evict {
                Some((k, worst)) if q.duration > worst => {
                    self.queries.remove(&k);
                }
                _ => return,
            }
        }
        self.queries.insert(
            key,
            SlowQueryStats {
                count: 1,
                total: q.duration,
                min: q.duration,
                max: q.duration,
                slowest: q,
            },
        );
    }

    /// Merge a failed harvest back, summing counts and keeping the worst
    /// observation per key.
    pub fn merge(&mut self, other: SlowQueryAggregator) {
        for (key, stats) in other.queries {
            match self.queries.get_mut(&key) {
                Some(existing) => existing.merge(stats),
                None => {
                    if self.queries.len() < MAX_SLOW_QUERIES {
                        self.queries.insert(key, stats);
                    }
                }
            }
        }
    }

    /// `sql_trace_data` payload: one entry per key, sorted by descending
    /// max duration.
    pub fn payload(&self) -> Option<Value> {
        if self.queries.is_empty() {
            return None;
        }
        let mut stats: Vec<&SlowQueryStats> = self.queries.values().collect();
        stats.sort_by(|a, b| b.max.cmp(&a.max));
        let entries: Vec<Value> = stats
            .into_iter()
            .map(|s| {
                let q = &s.slowest;
                json!([
                    q.txn_name,
                    q.txn_url.as_deref().unwrap_or(""),
                    query_id(&q.query),
                    q.query,
                    q.metric_name,
                    s.count,
                    duration_to_millis(s.total),
                    duration_to_millis(s.min),
                    duration_to_millis(s.max),
                    q.params,
                ])
            })
            .collect();
        Some(json!([entries]))
    }
}

/// Stable numeric id for a normalized query.
fn query_id(query: &str) -> u32 {
    let mut h = FxHasher::default();
    query.hash(&mut h);
    h.finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(metric: &str, text: &str, ms: u64) -> SlowQuery {
        SlowQuery {
            metric_name: metric.into(),
            query: text.into(),
            txn_name: "WebTransaction/Rust/hello".into(),
            txn_url: None,
            duration: Duration::from_millis(ms),
            params: json!({}),
        }
    }

    #[test]
    fn test_same_key_accumulates() {
        let mut agg = SlowQueryAggregator::new();
        agg.observe(query("Datastore/statement/MySQL/users/SELECT", "SELECT ?", 10));
        agg.observe(query("Datastore/statement/MySQL/users/SELECT", "SELECT ?", 30));
        agg.observe(query("Datastore/statement/MySQL/users/SELECT", "SELECT ?", 20));
        assert_eq!(agg.len(), 1);
        let p = agg.payload().unwrap();
        let entry = &p[0][0];
        assert_eq!(entry[5], 3); // count
        assert_eq!(entry[6], 60.0); // total ms
        assert_eq!(entry[7], 10.0); // min
        assert_eq!(entry[8], 30.0); // max
    }

    #[test]
    fn test_top_k_eviction() {
        let mut agg = SlowQueryAggregator::new();
        for i in 0..MAX_SLOW_QUERIES {
            agg.observe(query("m", &format!("q{i}"), 100 + i as u64));
        }
        // Faster than everything stored: rejected.
        agg.observe(query("m", "too-fast", 1));
        assert_eq!(agg.len(), MAX_SLOW_QUERIES);
        assert!(agg.payload().unwrap()[0]
            .as_array()
            .unwrap()
            .iter()
            .all(|e| e[3] != "too-fast"));
        // Slower than the current minimum: evicts it.
        agg.observe(query("m", "very-slow", 10_000));
        assert_eq!(agg.len(), MAX_SLOW_QUERIES);
        let p = agg.payload().unwrap();
        assert_eq!(p[0][0][3], "very-slow");
    }

    #[test]
    fn test_merge_sums_counts_keeps_worst() {
        let mut a = SlowQueryAggregator::new();
        let mut b = SlowQueryAggregator::new();
        a.observe(query("m", "q", 50));
        b.observe(query("m", "q", 80));
        b.observe(query("m", "q", 10));
        a.merge(b);
        let p = a.payload().unwrap();
        assert_eq!(p[0][0][5], 3);
        assert_eq!(p[0][0][8], 80.0);
    }

    #[test]
    fn test_empty_payload_none() {
        assert!(SlowQueryAggregator::new().payload().is_none());
    }
}
