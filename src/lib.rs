//! pulse_agent - Embeddable in-process APM agent
//!
//! Observes a host application's transactions, segments, errors, custom
//! events and logs; aggregates them into bounded priority-sampled
//! reservoirs and metric tables; and periodically harvests the aggregates
//! to a remote collector with backoff, merge-back, and server-tunable
//! limits.
//!
//! # Modules
//!
//! - [`application`] - Public facade: `Application`, transaction handles
//! - [`config`] - Programmatic agent configuration
//! - [`tracer`] - Transaction/segment state machine and breakdown metrics
//! - [`events`] - Per-type analytic event streams
//! - [`reservoir`] - Priority-sampled bounded reservoir
//! - [`metrics`] - Scoped/unscoped metric table
//! - [`attributes`] - Attribute destinations and filtering
//! - [`artifacts`] - Slow queries, transaction trace witness, error traces
//! - [`dt`] - Distributed trace context (W3C + legacy)
//! - [`harvest`] - Multi-cadence harvest engine
//! - [`collector`] - Collector transport contract and HTTP instance
//! - [`serialize`] - Payload encoding helpers

pub mod application;
pub mod artifacts;
pub mod attributes;
pub mod collector;
pub mod config;
pub mod connect_reply;
pub mod dt;
pub mod environment;
pub mod error_data;
pub mod errors;
pub mod events;
pub mod harvest;
pub mod limits;
pub mod logging;
pub mod metric_names;
pub mod metric_rules;
pub mod metrics;
pub mod priority;
pub mod reservoir;
pub mod serialize;
pub mod synthetics;
pub mod tracer;

// Convenient re-exports at crate root
pub use application::{Application, CodeLocation, StartOptions, TransactionHandle};
pub use attributes::AttributeValue;
pub use config::AgentConfig;
pub use dt::TransportType;
pub use error_data::ErrorData;
pub use events::log_event::LogData;
pub use priority::Priority;
pub use tracer::{MessageAction, MessageDestination, SegmentKind, SegmentToken};
