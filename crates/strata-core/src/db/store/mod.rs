//! Module: db::store
//! Responsibility: the contract this engine consumes from an ordered,
//! transactional key-value store, plus an in-process implementation.
//! Does not own: key layout (see `directory` and the index modules).

mod directory;
mod memory;
mod selector;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

// re-exports
pub use directory::{DirectoryCache, DirectoryLayer, Subspace};
pub use memory::{CommitFault, MemoryStore, MemoryTransaction};
pub use selector::KeySelector;

/// Store-wide key whose value changes whenever keyspace metadata changes.
pub const METADATA_VERSION_KEY: &[u8] = b"\xff/metadataVersion";

///
/// KvStore
///
/// Factory for transactions against one store.
///

pub trait KvStore: Send + Sync + 'static {
    type Tx: Transaction + 'static;

    fn create_transaction(&self) -> Result<Self::Tx, StoreError>;
}

///
/// Transaction
///
/// Serializable transaction. Reads see one snapshot plus the transaction's
/// own writes; non-snapshot reads participate in conflict detection.
///

#[async_trait]
pub trait Transaction: Send + Sync {
    async fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, StoreError>;

    /// Read one page of `range`. `iteration` starts at 1 and drives page
    /// growth for [`StreamingMode::Iterator`].
    async fn get_range(&self, range: &RangeOption, iteration: usize)
    -> Result<RangeResult, StoreError>;

    fn set(&self, key: &[u8], value: &[u8]);

    fn clear(&self, key: &[u8]);

    fn clear_range(&self, begin: &[u8], end: &[u8]);

    /// Write `value` under `key` once the 10 bytes at `offset` of the key
    /// are replaced by the commit versionstamp.
    fn set_versionstamped_key(&self, key: &[u8], offset: usize, value: &[u8])
    -> Result<(), StoreError>;

    /// Write `value` under `key` once the 10 bytes at `offset` of the value
    /// are replaced by the commit versionstamp.
    fn set_versionstamped_value(
        &self,
        key: &[u8],
        value: &[u8],
        offset: usize,
    ) -> Result<(), StoreError>;

    /// Register a watch that fires once the key's value differs from the
    /// value this transaction sees. Takes effect only after commit.
    async fn watch(&self, key: &[u8]) -> Result<Watch, StoreError>;

    async fn read_version(&self) -> Result<u64, StoreError>;

    async fn commit(self) -> Result<Versionstamp, StoreError>
    where
        Self: Sized;
}

///
/// KeyValue
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

///
/// RangeOption
///
/// One `[begin, end)` range read. A zero `limit` means unlimited.
///

#[derive(Clone, Debug)]
pub struct RangeOption {
    pub begin: KeySelector,
    pub end: KeySelector,
    pub limit: usize,
    pub reverse: bool,
    pub mode: StreamingMode,
    pub snapshot: bool,
}

impl RangeOption {
    #[must_use]
    pub const fn new(begin: KeySelector, end: KeySelector) -> Self {
        Self {
            begin,
            end,
            limit: 0,
            reverse: false,
            mode: StreamingMode::Iterator,
            snapshot: false,
        }
    }

    /// Range over every key starting with `prefix`.
    #[must_use]
    pub fn prefix(prefix: &[u8]) -> Self {
        Self::new(
            KeySelector::first_greater_or_equal(prefix.to_vec()),
            KeySelector::first_greater_or_equal(strinc(prefix)),
        )
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: StreamingMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }
}

///
/// RangeResult
///

#[derive(Clone, Debug, Default)]
pub struct RangeResult {
    pub kvs: Vec<KeyValue>,

    /// True if the range holds rows past the ones returned.
    pub more: bool,
}

///
/// StreamingMode
///
/// Page-size policy for range reads.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StreamingMode {
    /// Everything up to the limit in one page.
    WantAll,
    /// Small first page, growing with each iteration.
    #[default]
    Iterator,
    /// Exactly `limit` rows; the limit must be set.
    Exact,
    Small,
    Medium,
    Large,
    /// Everything up to the limit in one page, fetched serially.
    Serial,
}

impl StreamingMode {
    const ITERATOR_FIRST_PAGE: usize = 10;
    const ITERATOR_MAX_PAGE: usize = 1_000;

    /// Rows one page may return before the caller's limit applies.
    #[must_use]
    pub fn row_budget(self, iteration: usize) -> Option<usize> {
        match self {
            Self::WantAll | Self::Exact | Self::Serial => None,
            Self::Small => Some(10),
            Self::Medium => Some(100),
            Self::Large => Some(Self::ITERATOR_MAX_PAGE),
            Self::Iterator => {
                let doublings = u32::try_from(iteration.saturating_sub(1)).unwrap_or(u32::MAX);
                let budget = Self::ITERATOR_FIRST_PAGE
                    .checked_shl(doublings.min(16))
                    .unwrap_or(Self::ITERATOR_MAX_PAGE);
                Some(budget.min(Self::ITERATOR_MAX_PAGE))
            }
        }
    }
}

///
/// Versionstamp
///
/// Ten bytes assigned at commit: an 8-byte big-endian commit version and a
/// 2-byte batch order. Compares in commit order.
///

#[derive(Clone, Copy, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Versionstamp([u8; Self::LEN]);

impl Versionstamp {
    pub const LEN: usize = 10;

    /// Placeholder written before commit fills in the real stamp.
    #[must_use]
    pub const fn incomplete() -> Self {
        Self([0xFF; Self::LEN])
    }

    #[must_use]
    pub fn from_parts(commit_version: u64, batch_order: u16) -> Self {
        let mut bytes = [0u8; Self::LEN];
        bytes[..8].copy_from_slice(&commit_version.to_be_bytes());
        bytes[8..].copy_from_slice(&batch_order.to_be_bytes());
        Self(bytes)
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; Self::LEN]>::try_from(bytes).ok().map(Self)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        *self != Self::incomplete()
    }

    #[must_use]
    pub fn commit_version(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(buf)
    }
}

impl fmt::Debug for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Versionstamp({self})")
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

///
/// Watch
///
/// Resolves when the watched key changes. Dropping the owning transaction
/// without committing cancels it.
///

#[derive(Debug)]
pub struct Watch {
    rx: oneshot::Receiver<()>,
}

impl Watch {
    pub(crate) const fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx }
    }

    pub async fn changed(self) -> Result<(), StoreError> {
        self.rx.await.map_err(|_| StoreError::Unavailable {
            message: "watch cancelled before the key changed".to_string(),
        })
    }
}

/// First key that sorts after every key starting with `prefix`.
#[must_use]
pub fn strinc(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return end;
        }
    }

    // Nothing sorts after an all-0xFF prefix inside the user keyspace.
    vec![0xFF; prefix.len() + 1]
}

/// Stamp `METADATA_VERSION_KEY` with this transaction's commit version.
pub fn bump_metadata_version<T: Transaction + ?Sized>(tr: &T) -> Result<(), StoreError> {
    tr.set_versionstamped_value(
        METADATA_VERSION_KEY,
        Versionstamp::incomplete().as_bytes(),
        0,
    )
}

/// Read the current metadata version without adding a read conflict.
pub async fn metadata_version<T: Transaction + ?Sized>(
    tr: &T,
) -> Result<Option<Vec<u8>>, StoreError> {
    tr.get(METADATA_VERSION_KEY, true).await
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterator_pages_grow_until_capped() {
        let mode = StreamingMode::Iterator;
        assert_eq!(mode.row_budget(1), Some(10));
        assert_eq!(mode.row_budget(2), Some(20));
        assert_eq!(mode.row_budget(7), Some(640));
        assert_eq!(mode.row_budget(8), Some(1_000));
        assert_eq!(mode.row_budget(500), Some(1_000));
        assert_eq!(StreamingMode::WantAll.row_budget(1), None);
    }

    #[test]
    fn versionstamps_order_by_commit_then_batch() {
        let first = Versionstamp::from_parts(7, 1);
        let second = Versionstamp::from_parts(7, 2);
        let later = Versionstamp::from_parts(8, 0);
        assert!(first < second && second < later);
        assert_eq!(later.commit_version(), 8);
        assert!(later.is_complete());
        assert!(!Versionstamp::incomplete().is_complete());
        assert!(later < Versionstamp::incomplete());
    }

    #[test]
    fn prefix_range_covers_only_extensions() {
        let range = RangeOption::prefix(b"ab");
        assert_eq!(range.begin.key(), b"ab");
        assert_eq!(range.end.key(), b"ac");
        assert_eq!(strinc(b"a\xff\xff"), b"b".to_vec());
    }
}
