//! Segment kinds and metric naming
//!
//! A segment ends as one of four kinds; the kind decides the scoped metric
//! name, the unscoped category rollups, and the span category/attributes.
//! Metric synthesis dispatches on the kind tag, nothing else.

use crate::attributes::truncate_value;
use crate::events::span_event::SpanCategory;
use crate::metric_names::*;
use serde_json::{Map, Value};
use std::time::Duration;

/// Opaque handle for an open segment. Carries the owning tracing thread,
/// the stack depth at start, and a stamp that detects stale tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentToken {
    pub(crate) thread: usize,
    pub(crate) depth: usize,
    pub(crate) stamp: u64,
}

/// Message segment direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    Produce,
    Consume,
}

impl MessageAction {
    pub fn label(self) -> &'static str {
        match self {
            MessageAction::Produce => "Produce",
            MessageAction::Consume => "Consume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDestination {
    Queue,
    Topic,
    Exchange,
}

impl MessageDestination {
    pub fn label(self) -> &'static str {
        match self {
            MessageDestination::Queue => "Queue",
            MessageDestination::Topic => "Topic",
            MessageDestination::Exchange => "Exchange",
        }
    }
}

/// What a segment turned out to be when it finished.
#[derive(Debug, Clone)]
pub enum SegmentKind {
    Basic {
        name: String,
    },
    External {
        host: String,
        url: Option<String>,
        procedure: Option<String>,
        library: Option<String>,
        status_code: Option<u16>,
    },
    Datastore {
        product: String,
        collection: String,
        operation: String,
        host: Option<String>,
        port_path_or_id: Option<String>,
        database_name: Option<String>,
        /// Normalized query text; slow query candidate.
        query: Option<String>,
    },
    Message {
        library: String,
        destination: MessageDestination,
        destination_name: String,
        action: MessageAction,
    },
}

impl SegmentKind {
    /// Scoped metric name (scope = the transaction's final name).
    pub fn scoped_metric(&self) -> String {
        match self {
            SegmentKind::Basic { name } => format!("Custom/{name}"),
            SegmentKind::External {
                host,
                procedure,
                library,
                ..
            } => {
                let lib = library.as_deref().unwrap_or("http");
                match procedure {
                    Some(p) => format!("External/{host}/{lib}/{p}"),
                    None => format!("External/{host}/{lib}"),
                }
            }
            SegmentKind::Datastore {
                product,
                collection,
                operation,
                ..
            } => {
                if collection.is_empty() {
                    format!("{DATASTORE_OPERATION_PREFIX}{product}/{operation}")
                } else {
                    format!("{DATASTORE_STATEMENT_PREFIX}{product}/{collection}/{operation}")
                }
            }
            SegmentKind::Message {
                library,
                destination,
                destination_name,
                action,
            } => format!(
                "{MESSAGE_PREFIX}{library}/{}/{}/Named/{destination_name}",
                destination.label(),
                action.label()
            ),
        }
    }

    /// Unscoped rollup names, most general first.
    pub fn rollup_metrics(&self, is_web: bool) -> Vec<String> {
        match self {
            SegmentKind::Basic { .. } => Vec::new(),
            SegmentKind::External { host, .. } => vec![
                EXTERNAL_ALL.to_string(),
                if is_web {
                    EXTERNAL_ALL_WEB.to_string()
                } else {
                    EXTERNAL_ALL_OTHER.to_string()
                },
                format!("{EXTERNAL_PREFIX}{host}/all"),
            ],
            SegmentKind::Datastore {
                product, operation, ..
            } => vec![
                DATASTORE_ALL.to_string(),
                if is_web {
                    DATASTORE_ALL_WEB.to_string()
                } else {
                    DATASTORE_ALL_OTHER.to_string()
                },
                format!("{DATASTORE_PREFIX}{product}/all"),
                if is_web {
                    format!("{DATASTORE_PREFIX}{product}/allWeb")
                } else {
                    format!("{DATASTORE_PREFIX}{product}/allOther")
                },
                format!("{DATASTORE_OPERATION_PREFIX}{product}/{operation}"),
            ],
            SegmentKind::Message { .. } => vec![
                MESSAGE_ALL.to_string(),
                if is_web {
                    MESSAGE_ALL_WEB.to_string()
                } else {
                    MESSAGE_ALL_OTHER.to_string()
                },
            ],
        }
    }

    pub fn span_category(&self) -> SpanCategory {
        match self {
            SegmentKind::Basic { .. } => SpanCategory::Generic,
            SegmentKind::External { .. } => SpanCategory::Http,
            SegmentKind::Datastore { .. } => SpanCategory::Datastore,
            SegmentKind::Message { .. } => SpanCategory::Message,
        }
    }

    /// Span/trace node display name; same shape as the scoped metric.
    pub fn display_name(&self) -> String {
        self.scoped_metric()
    }

    /// Category-specific agent attributes for spans and trace nodes.
    pub fn agent_attrs(&self) -> Value {
        let mut m = Map::new();
        match self {
            SegmentKind::Basic { .. } => {}
            SegmentKind::External {
                url, procedure, status_code, ..
            } => {
                if let Some(url) = url {
                    m.insert("http.url".into(), truncate_value(url).into());
                }
                if let Some(p) = procedure {
                    m.insert("http.method".into(), p.clone().into());
                }
                if let Some(code) = status_code {
                    m.insert("http.statusCode".into(), (*code).into());
                }
            }
            SegmentKind::Datastore {
                collection,
                host,
                port_path_or_id,
                database_name,
                query,
                ..
            } => {
                if !collection.is_empty() {
                    m.insert("db.collection".into(), collection.clone().into());
                }
                if let Some(q) = query {
                    m.insert("db.statement".into(), truncate_value(q).into());
                }
                if let Some(db) = database_name {
                    m.insert("db.instance".into(), db.clone().into());
                }
                if let Some(h) = host {
                    m.insert("peer.hostname".into(), h.clone().into());
                    let port = port_path_or_id.as_deref().unwrap_or("unknown");
                    m.insert("peer.address".into(), format!("{h}:{port}").into());
                }
            }
            SegmentKind::Message {
                destination_name, ..
            } => {
                m.insert(
                    "message.destinationName".into(),
                    destination_name.clone().into(),
                );
            }
        }
        Value::Object(m)
    }
}

/// A finished segment, resolved against its thread's stack.
#[derive(Debug, Clone)]
pub struct SegmentEnd {
    pub thread: usize,
    /// Offsets from the transaction start.
    pub start_offset: Duration,
    pub stop_offset: Duration,
    pub duration: Duration,
    /// Duration minus time spent in children that finished inside this
    /// segment, floored at zero.
    pub exclusive: Duration,
    pub kind: SegmentKind,
    pub span_id: Option<String>,
    pub parent_span_id: Option<String>,
    /// Closed forcibly because an ancestor's token was finished first.
    pub order_violated: bool,
}
