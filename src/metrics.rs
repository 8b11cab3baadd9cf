//! Metric table - named scoped/unscoped aggregates
//!
//! Each (name, scope) key owns six running sums in the collector's wire
//! order: count, total, exclusive, min, max, sum-of-squares. Apdex metrics
//! reuse the same six slots with zone counts in the first three and the
//! threshold mirrored into min/max.
//!
//! Forced metrics (agent rollups, supportability counters) survive both the
//! table cap and server rename/ignore rules; unforced ones fold into an
//! overflow counter at capacity and obey `apply_rules`.

use crate::limits::MAX_METRICS;
use crate::metric_names::SUPPORT_METRICS_DROPPED;
use crate::metric_rules::MetricRules;
use crate::serialize::to_epoch_seconds;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use std::time::{Duration, SystemTime};

/// Apdex satisfaction zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApdexZone {
    /// duration <= threshold
    Satisfying,
    /// threshold < duration <= 4 * threshold
    Tolerating,
    /// duration > 4 * threshold, or the transaction errored
    Frustrating,
    /// Apdex not applicable (background work, zero threshold)
    None,
}

impl ApdexZone {
    /// Classify a duration against a threshold. Errors are handled by the
    /// caller (an errored transaction is always frustrating).
    pub fn classify(duration: Duration, threshold: Duration) -> ApdexZone {
        if threshold.is_zero() {
            ApdexZone::None
        } else if duration <= threshold {
            ApdexZone::Satisfying
        } else if duration <= 4 * threshold {
            ApdexZone::Tolerating
        } else {
            ApdexZone::Frustrating
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ApdexZone::Satisfying => "S",
            ApdexZone::Tolerating => "T",
            ApdexZone::Frustrating => "F",
            ApdexZone::None => "",
        }
    }
}

/// Metric identity: name plus optional transaction scope ("" = unscoped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId {
    pub name: String,
    pub scope: String,
}

impl MetricId {
    pub fn unscoped(name: impl Into<String>) -> Self {
        MetricId {
            name: name.into(),
            scope: String::new(),
        }
    }

    pub fn scoped(name: impl Into<String>, scope: impl Into<String>) -> Self {
        MetricId {
            name: name.into(),
            scope: scope.into(),
        }
    }
}

/// The six wire slots.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricData {
    pub count: f64,
    pub total: f64,
    pub exclusive: f64,
    pub min: f64,
    pub max: f64,
    pub sum_squares: f64,
}

impl MetricData {
    fn for_count(count: f64) -> Self {
        MetricData {
            count,
            ..Default::default()
        }
    }

    fn for_duration(total: Duration, exclusive: Duration) -> Self {
        let t = total.as_secs_f64();
        MetricData {
            count: 1.0,
            total: t,
            exclusive: exclusive.as_secs_f64(),
            min: t,
            max: t,
            sum_squares: t * t,
        }
    }

    fn for_value(value: f64) -> Self {
        MetricData {
            count: 1.0,
            total: value,
            exclusive: value,
            min: value,
            max: value,
            sum_squares: value * value,
        }
    }

    fn for_apdex(zone: ApdexZone, threshold: Duration) -> Self {
        let t = threshold.as_secs_f64();
        let (s, tol, f) = match zone {
            ApdexZone::Satisfying => (1.0, 0.0, 0.0),
            ApdexZone::Tolerating => (0.0, 1.0, 0.0),
            ApdexZone::Frustrating => (0.0, 0.0, 1.0),
            ApdexZone::None => (0.0, 0.0, 0.0),
        };
        MetricData {
            count: s,
            total: tol,
            exclusive: f,
            min: t,
            max: t,
            sum_squares: 0.0,
        }
    }

    fn merge(&mut self, other: &MetricData) {
        if other.count == 0.0 && self.count != 0.0 {
            return;
        }
        if self.count == 0.0 {
            *self = *other;
            return;
        }
        self.count += other.count;
        self.total += other.total;
        self.exclusive += other.exclusive;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum_squares += other.sum_squares;
    }

    /// Apdex slots sum instead of min/max-ing; the threshold columns track
    /// the smallest/largest threshold seen over the period.
    fn merge_apdex(&mut self, other: &MetricData) {
        self.count += other.count;
        self.total += other.total;
        self.exclusive += other.exclusive;
        self.min = if self.min == 0.0 {
            other.min
        } else {
            self.min.min(other.min)
        };
        self.max = self.max.max(other.max);
    }

    fn wire(&self) -> Value {
        json!([
            self.count,
            self.total,
            self.exclusive,
            self.min,
            self.max,
            self.sum_squares
        ])
    }
}

#[derive(Debug, Clone)]
struct Metric {
    data: MetricData,
    forced: bool,
    apdex: bool,
}

/// Bounded table of metric aggregates for one harvest period.
#[derive(Debug, Clone)]
pub struct MetricTable {
    metrics: FxHashMap<MetricId, Metric>,
    max_metrics: usize,
    period_start: SystemTime,
}

impl MetricTable {
    pub fn new(period_start: SystemTime) -> Self {
        Self::with_capacity(period_start, MAX_METRICS)
    }

    pub fn with_capacity(period_start: SystemTime, max_metrics: usize) -> Self {
        MetricTable {
            metrics: FxHashMap::default(),
            max_metrics,
            period_start,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    #[inline]
    pub fn period_start(&self) -> SystemTime {
        self.period_start
    }

    pub fn add_count(&mut self, name: &str, delta: f64, forced: bool) {
        self.upsert(
            MetricId::unscoped(name),
            MetricData::for_count(delta),
            forced,
            false,
        );
    }

    pub fn add_duration(
        &mut self,
        name: &str,
        scope: &str,
        total: Duration,
        exclusive: Duration,
        forced: bool,
    ) {
        self.upsert(
            MetricId::scoped(name, scope),
            MetricData::for_duration(total, exclusive),
            forced,
            false,
        );
    }

    pub fn add_apdex(
        &mut self,
        name: &str,
        scope: &str,
        threshold: Duration,
        zone: ApdexZone,
        forced: bool,
    ) {
        if zone == ApdexZone::None {
            return;
        }
        self.upsert(
            MetricId::scoped(name, scope),
            MetricData::for_apdex(zone, threshold),
            forced,
            true,
        );
    }

    pub fn add_value(&mut self, name: &str, scope: &str, value: f64, forced: bool) {
        self.upsert(
            MetricId::scoped(name, scope),
            MetricData::for_value(value),
            forced,
            false,
        );
    }

    fn upsert(&mut self, id: MetricId, data: MetricData, forced: bool, apdex: bool) {
        if let Some(existing) = self.metrics.get_mut(&id) {
            if apdex {
                existing.data.merge_apdex(&data);
            } else {
                existing.data.merge(&data);
            }
            existing.forced = existing.forced || forced;
            return;
        }
        if !forced && self.metrics.len() >= self.max_metrics {
            // Table full: fold the attempt into the overflow counter.
            let overflow = MetricId::unscoped(SUPPORT_METRICS_DROPPED);
            self.metrics
                .entry(overflow)
                .and_modify(|m| m.data.count += 1.0)
                .or_insert(Metric {
                    data: MetricData::for_count(1.0),
                    forced: true,
                    apdex: false,
                });
            return;
        }
        self.metrics.insert(
            id,
            Metric {
                data,
                forced,
                apdex,
            },
        );
    }

    /// Look up the wire slots for a metric; test and payload helper.
    pub fn get(&self, name: &str, scope: &str) -> Option<MetricData> {
        self.metrics
            .get(&MetricId::scoped(name, scope))
            .map(|m| m.data)
    }

    pub fn has(&self, name: &str, scope: &str) -> bool {
        self.metrics.contains_key(&MetricId::scoped(name, scope))
    }

    /// Fold another table in. The merged table keeps the OLDER period start
    /// so the reported window covers both constituents.
    pub fn merge(&mut self, other: MetricTable) {
        if other.period_start < self.period_start {
            self.period_start = other.period_start;
        }
        for (id, metric) in other.metrics {
            match self.metrics.get_mut(&id) {
                Some(existing) => {
                    if metric.apdex {
                        existing.data.merge_apdex(&metric.data);
                    } else {
                        existing.data.merge(&metric.data);
                    }
                    existing.forced = existing.forced || metric.forced;
                }
                None => {
                    self.metrics.insert(id, metric);
                }
            }
        }
    }

    /// Apply server rename/ignore rules. Forced metrics are immune; unforced
    /// ones are renamed by first-match substring replacement or dropped when
    /// the matching rule says ignore.
    pub fn apply_rules(&mut self, rules: &MetricRules) {
        if rules.is_empty() {
            return;
        }
        let mut rebuilt: FxHashMap<MetricId, Metric> = FxHashMap::default();
        for (id, metric) in self.metrics.drain() {
            if metric.forced {
                merge_entry(&mut rebuilt, id, metric);
                continue;
            }
            match rules.apply(&id.name) {
                None => {} // ignored
                Some(renamed) => {
                    let new_id = MetricId {
                        name: renamed,
                        scope: id.scope,
                    };
                    merge_entry(&mut rebuilt, new_id, metric);
                }
            }
        }
        self.metrics = rebuilt;
    }

    /// `metric_data` payload:
    /// `[run_id, period_start_s, now_s, [[{"name","scope"},[six slots]]…]]`
    /// with entries sorted by (name, scope) so output is deterministic.
    pub fn payload(&self, run_id: &str, now: SystemTime) -> Value {
        let mut ids: Vec<&MetricId> = self.metrics.keys().collect();
        ids.sort();
        let entries: Vec<Value> = ids
            .into_iter()
            .map(|id| {
                let metric = &self.metrics[id];
                let key = if id.scope.is_empty() {
                    json!({ "name": id.name })
                } else {
                    json!({ "name": id.name, "scope": id.scope })
                };
                json!([key, metric.data.wire()])
            })
            .collect();
        json!([
            run_id,
            to_epoch_seconds(self.period_start),
            to_epoch_seconds(now),
            entries
        ])
    }
}

fn merge_entry(map: &mut FxHashMap<MetricId, Metric>, id: MetricId, metric: Metric) {
    match map.get_mut(&id) {
        Some(existing) => {
            if metric.apdex {
                existing.data.merge_apdex(&metric.data);
            } else {
                existing.data.merge(&metric.data);
            }
            existing.forced = existing.forced || metric.forced;
        }
        None => {
            map.insert(id, metric);
        }
    }
}
