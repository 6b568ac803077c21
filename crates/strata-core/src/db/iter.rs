//! Module: db::iter
//! Responsibility: resumable paging over one logical range scan.
//! Does not own: decoding of the rows it returns.

use crate::{
    db::store::{KeySelector, KeyValue, RangeOption, RangeResult, StreamingMode, Transaction},
    error::{ErrorOrigin, InternalError},
    obs::sink::{self, MetricsEvent},
};

///
/// ResultIterator
///
/// Wraps `[begin, end)` with a soft row limit. Each page advances the
/// selectors past the last returned key, so the scan can be extended with
/// [`ResultIterator::increase_limit`] without restarting.
///
/// Two end states are tracked separately: `done` (no page will be read
/// without a limit increase) and `done_with_range` (the range itself is
/// exhausted). Only the latter means every matching row has been seen.
///

pub struct ResultIterator<'a, T: Transaction + ?Sized> {
    tr: &'a T,
    begin: KeySelector,
    end: KeySelector,
    limit: usize,
    reverse: bool,
    mode: StreamingMode,
    snapshot: bool,
    fetched: usize,
    iteration: usize,
    done: bool,
    done_with_range: bool,
}

impl<'a, T: Transaction + ?Sized> ResultIterator<'a, T> {
    #[must_use]
    pub const fn new(tr: &'a T, begin: KeySelector, end: KeySelector) -> Self {
        Self {
            tr,
            begin,
            end,
            limit: 0,
            reverse: false,
            mode: StreamingMode::Iterator,
            snapshot: false,
            fetched: 0,
            iteration: 0,
            done: false,
            done_with_range: false,
        }
    }

    /// Build from a range description, keeping its limit, order and mode.
    #[must_use]
    pub fn from_range(tr: &'a T, range: RangeOption) -> Self {
        Self::new(tr, range.begin, range.end)
            .with_limit(range.limit)
            .reversed(range.reverse)
            .with_mode(range.mode)
            .snapshot(range.snapshot)
    }

    /// Soft limit on rows across all pages; zero means unlimited.
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

    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub const fn done_with_range(&self) -> bool {
        self.done_with_range
    }

    #[must_use]
    pub const fn fetched(&self) -> usize {
        self.fetched
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Allow `delta` more rows. Has no effect once the range is exhausted.
    pub const fn increase_limit(&mut self, delta: usize) {
        if !self.done_with_range {
            self.limit = self.limit.saturating_add(delta);
            self.done = false;
        }
    }

    /// Issue one bounded range read and advance past its last key.
    ///
    /// Returns the rows and whether another call may return more.
    pub async fn next_page(&mut self) -> Result<RangeResult, InternalError> {
        if self.done {
            return Ok(RangeResult::default());
        }

        self.iteration += 1;
        let remaining = if self.limit > 0 {
            self.limit.saturating_sub(self.fetched)
        } else {
            0
        };
        let range = RangeOption {
            begin: self.begin.clone(),
            end: self.end.clone(),
            limit: remaining,
            reverse: self.reverse,
            mode: self.mode,
            snapshot: self.snapshot,
        };

        let result = self
            .tr
            .get_range(&range, self.iteration)
            .await
            .map_err(|err| InternalError::store(ErrorOrigin::Iterator, err))?;

        self.fetched += result.kvs.len();
        sink::record(MetricsEvent::PageRead {
            rows: u64::try_from(result.kvs.len()).unwrap_or(u64::MAX),
        });

        if let Some(last) = result.kvs.last() {
            if self.reverse {
                self.end = KeySelector::first_greater_or_equal(last.key.clone());
            } else {
                self.begin = KeySelector::first_greater_than(last.key.clone());
            }
        }

        let more = result.more && !result.kvs.is_empty();
        let reached_limit = self.limit > 0 && self.fetched >= self.limit;
        self.done = !more || reached_limit;
        self.done_with_range = !more && !reached_limit;

        Ok(RangeResult {
            kvs: result.kvs,
            more: !self.done,
        })
    }

    /// Drain every remaining page into one ordered list.
    pub async fn list(mut self) -> Result<Vec<KeyValue>, InternalError> {
        if self.mode != StreamingMode::Exact {
            self.mode = StreamingMode::WantAll;
        }

        let mut rows = Vec::new();
        while !self.done {
            rows.extend(self.next_page().await?.kvs);
        }

        Ok(rows)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{KvStore, MemoryStore, MemoryTransaction};

    async fn seeded(count: u8) -> MemoryStore {
        let store = MemoryStore::new();
        let tr = store.create_transaction().expect("transaction should open");
        for i in 0..count {
            tr.set(&[b'r', i], &[i]);
        }
        tr.commit().await.expect("commit should succeed");
        store
    }

    fn whole(tr: &MemoryTransaction) -> ResultIterator<'_, MemoryTransaction> {
        ResultIterator::from_range(tr, RangeOption::prefix(b"r"))
    }

    #[tokio::test]
    async fn pages_resume_past_the_last_key() {
        let store = seeded(25).await;
        let tr = store.create_transaction().expect("transaction should open");
        let mut iter = whole(&tr);

        let first = iter.next_page().await.expect("page should read");
        assert_eq!(first.kvs.len(), 10);
        assert!(first.more);

        let second = iter.next_page().await.expect("page should read");
        assert_eq!(second.kvs.len(), 15);
        assert_eq!(second.kvs[0].key(), &[b'r', 10]);
        assert!(!second.more);
        assert!(iter.done_with_range());
    }

    #[tokio::test]
    async fn hitting_the_limit_is_not_exhausting_the_range() {
        let store = seeded(5).await;
        let tr = store.create_transaction().expect("transaction should open");
        let mut iter = whole(&tr).with_limit(3);

        let page = iter.next_page().await.expect("page should read");
        assert_eq!(page.kvs.len(), 3);
        assert!(iter.is_done());
        assert!(!iter.done_with_range());

        iter.increase_limit(1);
        let page = iter.next_page().await.expect("page should read");
        assert_eq!(page.kvs.len(), 1);
        assert_eq!(page.kvs[0].key(), &[b'r', 3]);
        assert_eq!(iter.fetched(), 4);
    }

    #[tokio::test]
    async fn increase_limit_is_ignored_once_the_range_is_exhausted() {
        let store = seeded(2).await;
        let tr = store.create_transaction().expect("transaction should open");
        let mut iter = whole(&tr).with_limit(10);

        iter.next_page().await.expect("page should read");
        assert!(iter.done_with_range());

        iter.increase_limit(5);
        assert!(iter.is_done());
        assert_eq!(iter.limit(), 10);
    }

    #[tokio::test]
    async fn reverse_scans_walk_the_end_selector_down() {
        let store = seeded(12).await;
        let tr = store.create_transaction().expect("transaction should open");
        let mut iter = whole(&tr).reversed(true).with_mode(StreamingMode::Small);

        let mut seen = Vec::new();
        while !iter.is_done() {
            let page = iter.next_page().await.expect("page should read");
            seen.extend(page.kvs.iter().map(|kv| kv.key()[1]));
        }
        assert_eq!(seen, (0..12).rev().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn list_drains_every_page() {
        let store = seeded(40).await;
        let tr = store.create_transaction().expect("transaction should open");
        let rows = whole(&tr).list().await.expect("list should succeed");
        assert_eq!(rows.len(), 40);
    }
}
