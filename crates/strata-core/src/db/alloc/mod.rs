//! Module: db::alloc
//! Responsibility: reserving blocks of entity ids with compare-and-swap
//! against a per-project counter record.
//! Does not own: assigning reserved ids to keys.

mod scattered;


use crate::{
    db::store::{DirectoryCache, KvStore, Transaction},
    error::{ErrorClass, ErrorOrigin, InternalError, StoreError},
    obs::sink::{self, MetricsEvent},
    serialize::{deserialize, serialize},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use ulid::Ulid;

// re-exports
pub use scattered::{IdAllocators, ScatteredAllocator};

///
/// CONSTANTS
///

/// Bit width of the sequential id space.
pub const MAX_SEQUENTIAL_BIT: u32 = 52;

/// Largest id (and counter) handed out by the sequential allocator.
pub const MAX_SEQUENTIAL_ID: i64 = (1 << MAX_SEQUENTIAL_BIT) - 1;

/// Largest counter the scattered allocator may reserve.
pub const MAX_SCATTERED_COUNTER: i64 = (1 << (MAX_SEQUENTIAL_BIT - 1)) - 1;

/// Largest id produced from a scattered counter.
pub const MAX_SCATTERED_ID: i64 = MAX_SEQUENTIAL_ID + 1 + MAX_SCATTERED_COUNTER;

// Moves counter bit 0 to bit 50 once the 64-bit word is reversed.
const SCATTER_SHIFT: u32 = 64 - MAX_SEQUENTIAL_BIT + 1;

/// Spread a scattered counter across the upper id space.
///
/// Successive counters land far apart while staying unique, so freshly
/// created entities do not pile onto one key range.
#[must_use]
pub const fn to_scattered_id(counter: i64) -> i64 {
    let spread = (counter.cast_unsigned() << SCATTER_SHIFT).reverse_bits();

    MAX_SEQUENTIAL_ID + 1 + spread.cast_signed()
}

/// Recover the counter behind an id and the space it was allocated from.
///
/// Ids above the scattered space map to counter zero, which no allocator
/// ever reserves.
pub fn id_to_counter(id: i64) -> Result<(i64, AllocatorKind), InternalError> {
    if id > MAX_SCATTERED_ID {
        Ok((0, AllocatorKind::Scattered))
    } else if id > MAX_SEQUENTIAL_ID {
        let counter = id.cast_unsigned().reverse_bits() >> SCATTER_SHIFT;
        Ok((counter.cast_signed(), AllocatorKind::Scattered))
    } else if id > 0 {
        Ok((id, AllocatorKind::Sequential))
    } else {
        Err(InternalError::validation(
            ErrorOrigin::Allocator,
            format!("invalid id ({id})"),
        ))
    }
}

///
/// AllocatorKind
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AllocatorKind {
    Sequential,
    Scattered,
}

impl AllocatorKind {
    /// Directory holding this allocator's reservation record.
    #[must_use]
    pub const fn directory_name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential-allocator",
            Self::Scattered => "scattered-allocator",
        }
    }

    /// Largest counter this allocator may reserve.
    #[must_use]
    pub const fn max_counter(self) -> i64 {
        match self {
            Self::Sequential => MAX_SEQUENTIAL_ID,
            Self::Scattered => MAX_SCATTERED_COUNTER,
        }
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sequential => "sequential",
            Self::Scattered => "scattered",
        };
        write!(f, "{label}")
    }
}

///
/// ReservationRecord
///
/// Persisted counter state. `op_id` is rewritten on every advance so a
/// writer can tell whether an ambiguous commit was its own.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct ReservationRecord {
    last_reserved: i64,
    op_id: Ulid,
}

// Outcome of planning against the counter that was just read.
enum Plan {
    Advance { start: i64, new_reserved: i64 },
    Covered,
}

///
/// EntityIdAllocator
///
/// Reserves id blocks for one (project, allocator kind) record. Every
/// advance is a read-then-write in one transaction, so two writers racing
/// on the same counter cannot both commit.
///

pub struct EntityIdAllocator<S: KvStore> {
    store: Arc<S>,
    directories: Arc<DirectoryCache>,
    project_id: String,
    kind: AllocatorKind,
    retries: usize,

    // Highest counter this process has seen committed; spares a round trip
    // when a minimum is already covered.
    last_reserved_cache: Mutex<Option<i64>>,
}

impl<S: KvStore> EntityIdAllocator<S> {
    #[must_use]
    pub fn new(
        store: Arc<S>,
        directories: Arc<DirectoryCache>,
        project_id: impl Into<String>,
        kind: AllocatorKind,
        retries: usize,
    ) -> Self {
        Self {
            store,
            directories,
            project_id: project_id.into(),
            kind,
            retries: retries.max(1),
            last_reserved_cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub const fn kind(&self) -> AllocatorKind {
        self.kind
    }

    /// Reserve the next `size` counters, returned as an inclusive range.
    pub async fn allocate_size(&self, size: i64) -> Result<(i64, i64), InternalError> {
        self.allocate_size_with_min(size, None).await
    }

    /// Reserve `size` counters that all lie above `min_counter`.
    pub async fn allocate_size_with_min(
        &self,
        size: i64,
        min_counter: Option<i64>,
    ) -> Result<(i64, i64), InternalError> {
        if size < 1 {
            return Err(InternalError::validation(
                ErrorOrigin::Allocator,
                format!("block size must be positive, got {size}"),
            ));
        }
        let max_allowed = self.kind.max_counter();

        self.reserve(|last_reserved| {
            let floor = min_counter.map_or(last_reserved, |min| min.max(last_reserved));
            let new_reserved = floor
                .checked_add(size)
                .filter(|reserved| *reserved <= max_allowed)
                .ok_or_else(exhausted)?;

            Ok(Plan::Advance {
                start: floor + 1,
                new_reserved,
            })
        })
        .await
    }

    /// Reserve every counter up to and including `max_id`.
    ///
    /// When the counter already covers `max_id` nothing is written and the
    /// returned range is empty (`start > end`).
    pub async fn allocate_max(&self, max_id: i64) -> Result<(i64, i64), InternalError> {
        if max_id > self.kind.max_counter() {
            return Err(exhausted());
        }

        self.reserve(|last_reserved| {
            if last_reserved >= max_id {
                return Ok(Plan::Covered);
            }

            Ok(Plan::Advance {
                start: last_reserved + 1,
                new_reserved: max_id,
            })
        })
        .await
    }

    /// Make sure `counter` is never handed out again.
    pub async fn set_min_counter(&self, counter: i64) -> Result<(), InternalError> {
        if self.cached_last_reserved().is_some_and(|cached| cached >= counter) {
            return Ok(());
        }

        self.allocate_max(counter).await.map(|_| ())
    }

    pub(crate) fn cached_last_reserved(&self) -> Option<i64> {
        *self.last_reserved_cache.lock()
    }

    async fn reserve<F>(&self, plan: F) -> Result<(i64, i64), InternalError>
    where
        F: Fn(i64) -> Result<Plan, InternalError>,
    {
        for attempt in 1..=self.retries {
            let tr = self.store.create_transaction().map_err(store_error)?;
            let key = self.record_key(&tr).await?;
            let last_reserved = self
                .read_record(&tr, &key, false)
                .await?
                .map_or(0, |record| record.last_reserved);
            self.note_reserved(last_reserved);

            let (start, new_reserved) = match plan(last_reserved)? {
                Plan::Covered => return Ok((last_reserved + 1, last_reserved)),
                Plan::Advance {
                    start,
                    new_reserved,
                } => (start, new_reserved),
            };

            let op_id = Ulid::new();
            let record = ReservationRecord {
                last_reserved: new_reserved,
                op_id,
            };
            tr.set(&key, &serialize(&record)?);

            let failure = match tr.commit().await {
                Ok(_) => None,
                Err(err) if err.maybe_committed() => {
                    if self.last_op_id().await? == Some(op_id) {
                        None
                    } else {
                        Some(err)
                    }
                }
                Err(err) if err.is_retryable() => Some(err),
                Err(err) => return Err(store_error(err)),
            };

            match failure {
                None => {
                    self.note_reserved(new_reserved);
                    sink::record(MetricsEvent::IdsReserved {
                        project_id: &self.project_id,
                        count: (new_reserved - start + 1).cast_unsigned(),
                    });
                    tracing::debug!(
                        project_id = %self.project_id,
                        kind = %self.kind,
                        start,
                        end = new_reserved,
                        "reserved ids"
                    );

                    return Ok((start, new_reserved));
                }
                Some(err) => {
                    sink::record(MetricsEvent::ReservationRetry);
                    tracing::warn!(
                        project_id = %self.project_id,
                        kind = %self.kind,
                        attempt,
                        error = %err,
                        "lost reservation race; re-reading counter"
                    );
                }
            }
        }

        Err(InternalError::new(
            ErrorClass::Unavailable,
            ErrorOrigin::Allocator,
            format!(
                "unable to reserve {} ids for project '{}' after {} attempts",
                self.kind, self.project_id, self.retries
            ),
        ))
    }

    async fn record_key(&self, tr: &S::Tx) -> Result<Vec<u8>, InternalError> {
        let subspace = self
            .directories
            .open(tr, &[&self.project_id, self.kind.directory_name()])
            .await?;

        Ok(subspace.prefix().to_vec())
    }

    async fn read_record(
        &self,
        tr: &S::Tx,
        key: &[u8],
        snapshot: bool,
    ) -> Result<Option<ReservationRecord>, InternalError> {
        let Some(bytes) = tr.get(key, snapshot).await.map_err(store_error)? else {
            return Ok(None);
        };

        Ok(Some(deserialize(&bytes)?))
    }

    // Token of whoever last advanced the counter, read in a fresh transaction.
    async fn last_op_id(&self) -> Result<Option<Ulid>, InternalError> {
        let tr = self.store.create_transaction().map_err(store_error)?;
        let key = self.record_key(&tr).await?;

        Ok(self.read_record(&tr, &key, true).await?.map(|r| r.op_id))
    }

    fn note_reserved(&self, last_reserved: i64) {
        let mut cache = self.last_reserved_cache.lock();
        if cache.is_none_or(|cached| cached < last_reserved) {
            *cache = Some(last_reserved);
        }
    }
}

fn exhausted() -> InternalError {
    InternalError::validation(ErrorOrigin::Allocator, "exceeded maximum allocated ids")
}

fn store_error(err: StoreError) -> InternalError {
    InternalError::store(ErrorOrigin::Allocator, err)
}
