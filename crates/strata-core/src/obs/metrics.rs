use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, process-wide counters.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub projects: BTreeMap<String, ProjectCounters>,
    pub since_ms: u64,
}

impl EventState {
    const fn empty() -> Self {
        Self {
            ops: EventOps::empty(),
            projects: BTreeMap::new(),
            since_ms: 0,
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Allocation
    pub ids_reserved: u64,
    pub reservation_retries: u64,

    // Range scans
    pub pages_read: u64,
    pub rows_read: u64,

    // Planner
    pub index_matches_exact: u64,
    pub index_matches_structural: u64,
    pub needs_index: u64,

    // Index construction
    pub backfill_rows: u64,
    pub backfill_checkpoints: u64,
    pub indexes_ready: u64,
}

impl EventOps {
    const fn empty() -> Self {
        Self {
            ids_reserved: 0,
            reservation_retries: 0,
            pages_read: 0,
            rows_read: 0,
            index_matches_exact: 0,
            index_matches_structural: 0,
            needs_index: 0,
            backfill_rows: 0,
            backfill_checkpoints: 0,
            indexes_ready: 0,
        }
    }
}

///
/// ProjectCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProjectCounters {
    pub ids_reserved: u64,
    pub backfill_rows: u64,
    pub indexes_ready: u64,
}

static EVENT_STATE: Mutex<EventState> = Mutex::new(EventState::empty());

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    f(&EVENT_STATE.lock())
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    f(&mut EVENT_STATE.lock())
}

/// Reset all counters and restart the reporting window.
pub(crate) fn reset_all() {
    with_state_mut(|m| {
        *m = EventState {
            since_ms: now_millis(),
            ..EventState::default()
        };
    });
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

///
/// EventReport
/// Point-in-time copy of the counters plus per-project summaries.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: EventState,
    pub avg_rows_per_page: f64,
}

#[expect(clippy::cast_precision_loss)]
pub(crate) fn report() -> EventReport {
    let snap = with_state(Clone::clone);
    let avg_rows_per_page = if snap.ops.pages_read > 0 {
        snap.ops.rows_read as f64 / snap.ops.pages_read as f64
    } else {
        0.0
    };

    EventReport {
        counters: snap,
        avg_rows_per_page,
    }
}
