//! Observability: runtime counters and the sink abstraction that feeds them.
//!
//! This module does not access storage internals directly.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventReport, EventState, ProjectCounters};
pub use sink::{MatchKind, MetricsEvent, MetricsSink, metrics_report, metrics_reset_all};
