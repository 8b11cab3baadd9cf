//! Harvest-cycle trace artifacts: slow queries, the transaction trace
//! witness, and the bounded error trace buffer.

pub mod error_trace;
pub mod slow_queries;
pub mod txn_trace;

pub use error_trace::{ErrorTrace, ErrorTraces};
pub use slow_queries::{SlowQuery, SlowQueryAggregator};
pub use txn_trace::{TraceNode, TxnTrace, TxnTraces};
