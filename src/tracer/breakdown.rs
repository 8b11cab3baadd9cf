//! Breakdown metric synthesis
//!
//! Turns a finished transaction into its metric delta table: transaction
//! and total-time rollups, apdex, error rollups, caller rollups, and the
//! per-segment scoped and category metrics. Everything transaction-level is
//! forced; per-segment metrics are unforced so server rules can reshape
//! them.

use crate::metric_names::*;
use crate::metrics::{ApdexZone, MetricTable};
use crate::tracer::segment::{SegmentEnd, SegmentKind};
use std::time::Duration;

pub(crate) struct TxnSummary<'a> {
    pub final_name: &'a str,
    pub is_web: bool,
    pub duration: Duration,
    /// Duration minus top-level segment time on the primary thread.
    pub exclusive: Duration,
    pub total_time: Duration,
    pub apdex_zone: ApdexZone,
    pub apdex_threshold: Duration,
    pub unexpected_errors: usize,
    pub expected_errors: usize,
    /// `type/account/app/transport` caller quadruple.
    pub caller: &'a str,
    pub segments: &'a [SegmentEnd],
    pub order_violations: u32,
    pub attrs_dropped: u32,
    pub dt_accept_success: u32,
    pub dt_accept_exception: u32,
    pub dt_create_before_accept: u32,
    pub dt_create_success: u32,
}

/// Name with the transaction-kind prefix swapped, e.g.
/// `WebTransaction/Rust/hello` -> `Apdex/Rust/hello`.
fn reprefix(final_name: &str, new_prefix: &str) -> String {
    let rest = final_name
        .strip_prefix(WEB_PREFIX)
        .or_else(|| final_name.strip_prefix(OTHER_PREFIX))
        .unwrap_or(final_name);
    format!("{new_prefix}{rest}")
}

pub(crate) fn create_txn_metrics(s: &TxnSummary, table: &mut MetricTable) {
    // Transaction duration rollups.
    let rollup = if s.is_web { WEB_ROLLUP } else { OTHER_ROLLUP };
    table.add_duration(rollup, "", s.duration, s.exclusive, true);
    table.add_duration(s.final_name, "", s.duration, s.exclusive, true);

    // Total time (busy time across all cooperating threads).
    let tt_rollup = if s.is_web {
        WEB_TOTAL_TIME
    } else {
        OTHER_TOTAL_TIME
    };
    let tt_prefix = if s.is_web {
        WEB_TOTAL_TIME_PREFIX
    } else {
        OTHER_TOTAL_TIME_PREFIX
    };
    table.add_duration(tt_rollup, "", s.total_time, s.total_time, true);
    table.add_duration(
        &reprefix(s.final_name, tt_prefix),
        "",
        s.total_time,
        s.total_time,
        true,
    );

    // Apdex.
    if s.apdex_zone != ApdexZone::None {
        table.add_apdex(APDEX_ROLLUP, "", s.apdex_threshold, s.apdex_zone, true);
        table.add_apdex(
            &reprefix(s.final_name, APDEX_PREFIX),
            "",
            s.apdex_threshold,
            s.apdex_zone,
            true,
        );
    }

    // Error rollups.
    let web_or_other_errors = if s.is_web {
        ERRORS_ALL_WEB
    } else {
        ERRORS_ALL_OTHER
    };
    if s.unexpected_errors > 0 {
        let n = s.unexpected_errors as f64;
        table.add_count(ERRORS_ALL, n, true);
        table.add_count(web_or_other_errors, n, true);
        table.add_count(&format!("{ERRORS_PREFIX}{}", s.final_name), n, true);
        table.add_count(
            &format!("{ERRORS_BY_CALLER_PREFIX}{}/all", s.caller),
            n,
            true,
        );
        table.add_count(
            &format!(
                "{ERRORS_BY_CALLER_PREFIX}{}/{}",
                s.caller,
                if s.is_web { "allWeb" } else { "allOther" }
            ),
            n,
            true,
        );
    }
    if s.expected_errors > 0 {
        table.add_count(ERRORS_EXPECTED_ALL, s.expected_errors as f64, true);
    }

    // Caller rollups are always present; Unknown quadruple without DT.
    table.add_duration(
        &format!("{DURATION_BY_CALLER_PREFIX}{}/all", s.caller),
        "",
        s.duration,
        s.duration,
        true,
    );
    table.add_duration(
        &format!(
            "{DURATION_BY_CALLER_PREFIX}{}/{}",
            s.caller,
            if s.is_web { "allWeb" } else { "allOther" }
        ),
        "",
        s.duration,
        s.duration,
        true,
    );

    // Per-segment scoped metrics and category rollups.
    for seg in s.segments {
        table.add_duration(
            &seg.kind.scoped_metric(),
            s.final_name,
            seg.duration,
            seg.exclusive,
            false,
        );
        for rollup in seg.kind.rollup_metrics(s.is_web) {
            table.add_duration(&rollup, "", seg.duration, seg.exclusive, false);
        }
    }

    // Agent self-diagnostics.
    if s.order_violations > 0 {
        table.add_count(SUPPORT_SEGMENT_OUT_OF_ORDER, s.order_violations as f64, true);
    }
    if s.attrs_dropped > 0 {
        table.add_count(SUPPORT_ATTRIBUTES_DROPPED, s.attrs_dropped as f64, true);
    }
    if s.dt_accept_success > 0 {
        table.add_count(SUPPORT_DT_ACCEPT_SUCCESS, s.dt_accept_success as f64, true);
    }
    if s.dt_accept_exception > 0 {
        table.add_count(
            SUPPORT_DT_ACCEPT_EXCEPTION,
            s.dt_accept_exception as f64,
            true,
        );
    }
    if s.dt_create_before_accept > 0 {
        table.add_count(
            SUPPORT_DT_CREATE_BEFORE_ACCEPT,
            s.dt_create_before_accept as f64,
            true,
        );
    }
    if s.dt_create_success > 0 {
        table.add_count(SUPPORT_DT_CREATE_SUCCESS, s.dt_create_success as f64, true);
    }
}

/// External and datastore call totals for the transaction event.
pub(crate) fn segment_totals(segments: &[SegmentEnd]) -> (u64, Duration, u64, Duration) {
    let mut ext_count = 0;
    let mut ext_dur = Duration::ZERO;
    let mut ds_count = 0;
    let mut ds_dur = Duration::ZERO;
    for seg in segments {
        match seg.kind {
            SegmentKind::External { .. } => {
                ext_count += 1;
                ext_dur += seg.duration;
            }
            SegmentKind::Datastore { .. } => {
                ds_count += 1;
                ds_dur += seg.duration;
            }
            _ => {}
        }
    }
    (ext_count, ext_dur, ds_count, ds_dur)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn summary<'a>(segments: &'a [SegmentEnd]) -> TxnSummary<'a> {
        TxnSummary {
            final_name: "WebTransaction/Rust/hello",
            is_web: true,
            duration: Duration::from_secs(2),
            exclusive: Duration::from_secs(2),
            total_time: Duration::from_secs(3),
            apdex_zone: ApdexZone::Tolerating,
            apdex_threshold: Duration::from_millis(500),
            unexpected_errors: 0,
            expected_errors: 0,
            caller: UNKNOWN_CALLER,
            segments,
            order_violations: 0,
            attrs_dropped: 0,
            dt_accept_success: 0,
            dt_accept_exception: 0,
            dt_create_before_accept: 0,
            dt_create_success: 0,
        }
    }

    #[test]
    fn test_web_rollups() {
        let mut table = MetricTable::new(SystemTime::UNIX_EPOCH);
        create_txn_metrics(&summary(&[]), &mut table);
        assert_eq!(table.get(WEB_ROLLUP, "").unwrap().count, 1.0);
        assert_eq!(table.get("WebTransaction/Rust/hello", "").unwrap().count, 1.0);
        assert_eq!(table.get(WEB_TOTAL_TIME, "").unwrap().total, 3.0);
        assert_eq!(
            table
                .get("WebTransactionTotalTime/Rust/hello", "")
                .unwrap()
                .total,
            3.0
        );
        assert_eq!(table.get(APDEX_ROLLUP, "").unwrap().total, 1.0); // tolerating
        assert!(table.has("Apdex/Rust/hello", ""));
        assert!(table.has("DurationByCaller/Unknown/Unknown/Unknown/Unknown/all", ""));
        assert!(table.has(
            "DurationByCaller/Unknown/Unknown/Unknown/Unknown/allWeb",
            ""
        ));
        assert!(!table.has(ERRORS_ALL, ""));
    }

    #[test]
    fn test_background_rollups() {
        let mut table = MetricTable::new(SystemTime::UNIX_EPOCH);
        let mut s = summary(&[]);
        s.final_name = "OtherTransaction/Rust/worker";
        s.is_web = false;
        s.apdex_zone = ApdexZone::None;
        create_txn_metrics(&s, &mut table);
        assert!(table.has(OTHER_ROLLUP, ""));
        assert!(table.has("OtherTransactionTotalTime/Rust/worker", ""));
        assert!(!table.has(APDEX_ROLLUP, ""));
        assert!(table.has(
            "DurationByCaller/Unknown/Unknown/Unknown/Unknown/allOther",
            ""
        ));
    }

    #[test]
    fn test_error_rollups() {
        let mut table = MetricTable::new(SystemTime::UNIX_EPOCH);
        let mut s = summary(&[]);
        s.unexpected_errors = 2;
        s.expected_errors = 1;
        s.caller = "App/123/456/HTTP";
        create_txn_metrics(&s, &mut table);
        assert_eq!(table.get(ERRORS_ALL, "").unwrap().count, 2.0);
        assert_eq!(table.get(ERRORS_ALL_WEB, "").unwrap().count, 2.0);
        assert_eq!(
            table
                .get("Errors/WebTransaction/Rust/hello", "")
                .unwrap()
                .count,
            2.0
        );
        assert_eq!(
            table.get("ErrorsByCaller/App/123/456/HTTP/all", "").unwrap().count,
            2.0
        );
        assert_eq!(table.get(ERRORS_EXPECTED_ALL, "").unwrap().count, 1.0);
    }

    #[test]
    fn test_segment_metrics() {
        let segments = vec![SegmentEnd {
            thread: 0,
            start_offset: Duration::ZERO,
            stop_offset: Duration::from_secs(1),
            duration: Duration::from_secs(1),
            exclusive: Duration::from_secs(1),
            kind: SegmentKind::External {
                host: "api.example.com".into(),
                url: None,
                procedure: None,
                library: None,
                status_code: None,
            },
            span_id: None,
            parent_span_id: None,
            order_violated: false,
        }];
        let mut table = MetricTable::new(SystemTime::UNIX_EPOCH);
        create_txn_metrics(&summary(&segments), &mut table);
        assert!(table.has("External/api.example.com/http", "WebTransaction/Rust/hello"));
        assert!(table.has(EXTERNAL_ALL, ""));
        assert!(table.has(EXTERNAL_ALL_WEB, ""));
        assert!(table.has("External/api.example.com/all", ""));
        let (ext_count, ext_dur, ds_count, _) = segment_totals(&segments);
        assert_eq!(ext_count, 1);
        assert_eq!(ext_dur, Duration::from_secs(1));
        assert_eq!(ds_count, 0);
    }
}
