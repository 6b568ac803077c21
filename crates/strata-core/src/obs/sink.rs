//! Metrics sink boundary.
//!
//! Core DB logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
use crate::obs::metrics;

///
/// MatchKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchKind {
    Exact,
    Structural,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    IdsReserved { project_id: &'a str, count: u64 },
    ReservationRetry,
    PageRead { rows: u64 },
    IndexMatch { kind: MatchKind },
    NeedsIndex,
    BackfillRows { project_id: &'a str, rows: u64 },
    BackfillCheckpoint,
    IndexReady { project_id: &'a str },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default process-wide sink that writes into global metrics state.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::IdsReserved { project_id, count } => metrics::with_state_mut(|m| {
                m.ops.ids_reserved = m.ops.ids_reserved.saturating_add(count);
                let entry = m.projects.entry(project_id.to_string()).or_default();
                entry.ids_reserved = entry.ids_reserved.saturating_add(count);
            }),

            MetricsEvent::ReservationRetry => metrics::with_state_mut(|m| {
                m.ops.reservation_retries = m.ops.reservation_retries.saturating_add(1);
            }),

            MetricsEvent::PageRead { rows } => metrics::with_state_mut(|m| {
                m.ops.pages_read = m.ops.pages_read.saturating_add(1);
                m.ops.rows_read = m.ops.rows_read.saturating_add(rows);
            }),

            MetricsEvent::IndexMatch { kind } => metrics::with_state_mut(|m| match kind {
                MatchKind::Exact => {
                    m.ops.index_matches_exact = m.ops.index_matches_exact.saturating_add(1);
                }
                MatchKind::Structural => {
                    m.ops.index_matches_structural =
                        m.ops.index_matches_structural.saturating_add(1);
                }
            }),

            MetricsEvent::NeedsIndex => metrics::with_state_mut(|m| {
                m.ops.needs_index = m.ops.needs_index.saturating_add(1);
            }),

            MetricsEvent::BackfillRows { project_id, rows } => metrics::with_state_mut(|m| {
                m.ops.backfill_rows = m.ops.backfill_rows.saturating_add(rows);
                let entry = m.projects.entry(project_id.to_string()).or_default();
                entry.backfill_rows = entry.backfill_rows.saturating_add(rows);
            }),

            MetricsEvent::BackfillCheckpoint => metrics::with_state_mut(|m| {
                m.ops.backfill_checkpoints = m.ops.backfill_checkpoints.saturating_add(1);
            }),

            MetricsEvent::IndexReady { project_id } => metrics::with_state_mut(|m| {
                m.ops.indexes_ready = m.ops.indexes_ready.saturating_add(1);
                let entry = m.projects.entry(project_id.to_string()).or_default();
                entry.indexes_ready = entry.indexes_ready.saturating_add(1);
            }),
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    GLOBAL_METRICS_SINK.record(event);
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

///
/// TESTS
///
